//! Record types persisted in the ledger.

use deck_core::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};

/// Result of applying one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The entity did not exist.
    Created,
    /// The entity existed with different content.
    Configured,
    /// The entity existed with identical content.
    Unchanged,
}

impl ApplyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Configured => "configured",
            ApplyOutcome::Unchanged => "unchanged",
        }
    }
}

// ── Entities ──────────────────────────────────────────────────────

/// An applied entity as held by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource: Resource,
    /// `sha256:<hex>` of the entity's canonical JSON.
    pub digest: String,
    /// Starts at 1, bumped whenever an apply changes the entity.
    pub generation: u64,
    /// For claims: the volume the claim is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_to: Option<String>,
}

impl ResourceRecord {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Key within the kind's table.
    pub fn table_key(&self) -> &str {
        self.resource.name()
    }
}

// ── Runs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Applied,
    Failed,
    NotAttempted,
}

impl StageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Applied => "applied",
            StageStatus::Failed => "failed",
            StageStatus::NotAttempted => "not attempted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: ApplyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub status: StageStatus,
    #[serde(default)]
    pub outcomes: Vec<OutcomeRecord>,
    /// Commands run after the stage's entities were applied.
    #[serde(default)]
    pub execs: Vec<String>,
}

impl StageRecord {
    pub fn new(stage: &str, status: StageStatus) -> Self {
        Self {
            stage: stage.to_string(),
            status,
            outcomes: Vec::new(),
            execs: Vec::new(),
        }
    }
}

/// One sequencer invocation, in stage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Assigned by the ledger; 0 until stored.
    pub id: u64,
    pub project: String,
    /// Unix timestamp (seconds).
    pub started_at: u64,
    pub finished_at: u64,
    pub stages: Vec<StageRecord>,
    /// Error text if the run did not complete.
    pub error: Option<String>,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Entities created or configured by this run.
    pub fn changed(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| &s.outcomes)
            .filter(|o| o.outcome != ApplyOutcome::Unchanged)
            .count()
    }
}

// ── Exec journal ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRecord {
    /// Assigned by the ledger.
    pub seq: u64,
    pub workload: String,
    pub command: Vec<String>,
    pub exit_code: i32,
    /// Unix timestamp (seconds).
    pub at: u64,
}
