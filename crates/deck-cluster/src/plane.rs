//! The control plane seam.

use deck_core::{Resource, ResourceKind};
use deck_state::ApplyOutcome;

use crate::error::ClusterResult;

/// Output of a command run inside a workload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A cluster control plane: accepts entity definitions and reconciles to them.
///
/// `apply` must be idempotent: applying an identical entity twice yields
/// [`ApplyOutcome::Unchanged`] and creates nothing.
pub trait ControlPlane: Send + Sync {
    fn apply(&self, resource: &Resource) -> ClusterResult<ApplyOutcome>;

    fn get(&self, kind: ResourceKind, name: &str) -> ClusterResult<Option<Resource>>;

    fn list(&self) -> ClusterResult<Vec<Resource>>;

    /// Returns true if the entity existed. A volume bound to a claim is
    /// refused with [`ClusterError::Bound`](crate::ClusterError::Bound).
    fn delete(&self, kind: ResourceKind, name: &str) -> ClusterResult<bool>;

    /// Run a command in one replica of a workload.
    fn exec(&self, workload: &str, command: &[String]) -> ClusterResult<ExecOutput>;
}
