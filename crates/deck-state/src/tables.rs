//! redb table definitions for the deck ledger.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use deck_core::ResourceKind;
use redb::TableDefinition;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

pub const IMAGES: Table = TableDefinition::new("images");
pub const VOLUMES: Table = TableDefinition::new("volumes");
pub const CLAIMS: Table = TableDefinition::new("claims");
pub const SECRETS: Table = TableDefinition::new("secrets");
pub const CONFIGS: Table = TableDefinition::new("configs");
pub const WORKLOADS: Table = TableDefinition::new("workloads");
pub const ADDRESSES: Table = TableDefinition::new("addresses");
pub const ROUTES: Table = TableDefinition::new("routes");
pub const AUTOSCALERS: Table = TableDefinition::new("autoscalers");

/// Sequencer runs keyed by zero-padded run id.
pub const RUNS: Table = TableDefinition::new("runs");

/// Exec journal keyed by zero-padded sequence number.
pub const EXECS: Table = TableDefinition::new("execs");

/// The table holding entities of `kind`.
pub fn resource_table(kind: ResourceKind) -> Table {
    match kind {
        ResourceKind::Image => IMAGES,
        ResourceKind::Volume => VOLUMES,
        ResourceKind::Claim => CLAIMS,
        ResourceKind::Secret => SECRETS,
        ResourceKind::Config => CONFIGS,
        ResourceKind::Workload => WORKLOADS,
        ResourceKind::Address => ADDRESSES,
        ResourceKind::Route => ROUTES,
        ResourceKind::Autoscaler => AUTOSCALERS,
    }
}

/// Key for sequence-numbered tables, padded so lexical order is numeric order.
pub fn sequence_key(seq: u64) -> String {
    format!("{seq:020}")
}
