//! Dependency-ordered application of a deployment plan.
//!
//! # Components
//!
//! - **`graph`**: stage ordering (Kahn's algorithm, declaration-order ties)
//! - **`validate`**: static plan checks run before anything is applied
//! - **`sequencer`**: stage-by-stage apply, exec actions, run history, teardown

pub mod error;
pub mod graph;
pub mod sequencer;
pub mod validate;

pub use error::{SequencerError, SequencerResult};
pub use graph::StageGraph;
pub use sequencer::{RunLedger, RunReport, Sequencer};
pub use validate::ValidatePlan;
