//! Embedded ledger for deck.
//!
//! Backed by [redb](https://docs.rs/redb), records every applied entity,
//! the history of sequencer runs, and the journal of commands executed in
//! workloads.
//!
//! # Architecture
//!
//! One table per entity kind, keyed by entity name. Values are JSON-encoded
//! [`ResourceRecord`]s carrying the entity, its content digest and its
//! generation. Runs are keyed by a zero-padded sequence number so that key
//! order is run order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
