//! Sequencer error types.

use deck_cluster::ClusterError;
use deck_core::{Reference, ResourceKind};
use thiserror::Error;

/// Errors raised while validating a plan or running its stages.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("stage `{stage}` failed: {cause}")]
    StageApply {
        stage: String,
        #[source]
        cause: ClusterError,
    },

    #[error("stage `{stage}` teardown failed: {cause}")]
    StageDelete {
        stage: String,
        #[source]
        cause: ClusterError,
    },

    #[error("stage `{stage}` references {reference}, which no stage it depends on provides")]
    MissingDependency { stage: String, reference: Reference },

    #[error("cyclic dependency between stages: {}", stages.join(", "))]
    CyclicDependency { stages: Vec<String> },

    #[error("stage `{stage}` depends on unknown stage `{dependency}`")]
    UnknownStage { stage: String, dependency: String },

    #[error("stage `{0}` is declared more than once")]
    DuplicateStage(String),

    #[error("{resource} is declared by both `{first}` and `{second}`")]
    DuplicateResource {
        resource: Reference,
        first: String,
        second: String,
    },

    #[error("invalid name for {kind} `{name}` in stage `{stage}`: must be a lowercase DNS label")]
    InvalidName {
        stage: String,
        kind: ResourceKind,
        name: String,
    },

    #[error("{resource} in stage `{stage}`: binary_data key `{key}` is not hex")]
    MalformedSecret {
        stage: String,
        resource: Reference,
        key: String,
    },

    #[error("check `{0}` is declared more than once")]
    DuplicateCheck(String),

    #[error("interrupted after {} completed stage(s)", completed.len())]
    Interrupted { completed: Vec<String> },

    #[error("ledger error: {0}")]
    State(#[from] deck_state::StateError),
}

pub type SequencerResult<T> = Result<T, SequencerError>;
