//! Control plane error types.

use deck_core::{Reference, ResourceKind};
use thiserror::Error;

/// Errors raised while applying, reading or exercising entities.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid name for {kind} `{name}`: must be a lowercase DNS label")]
    InvalidName { kind: ResourceKind, name: String },

    #[error("{resource} rejected: {reason}")]
    Invalid { resource: Reference, reason: String },

    #[error("{resource} references {reference}, which does not exist")]
    MissingReference {
        resource: Reference,
        reference: Reference,
    },

    #[error("{set} has no key `{key}`")]
    MissingKey { set: Reference, key: String },

    #[error("volume `{volume}` is already bound to claim `{bound_to}`")]
    Bound { volume: String, bound_to: String },

    #[error("exec in workload `{workload}` failed: {reason}")]
    Exec { workload: String, reason: String },

    #[error("building image `{image}` failed: {reason}")]
    Build { image: String, reason: String },

    #[error("ledger error: {0}")]
    State(#[from] deck_state::StateError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

impl ClusterError {
    pub(crate) fn invalid(resource: Reference, reason: impl Into<String>) -> Self {
        ClusterError::Invalid {
            resource,
            reason: reason.into(),
        }
    }
}
