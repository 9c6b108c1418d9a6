//! The deployment sequencer: applies a plan's stages in dependency order.
//!
//! Each stage is applied in full before the next starts. The first failure
//! halts the run; stages already applied stay applied and later stages are
//! reported as not attempted. Applies are idempotent, so re-running a plan
//! after fixing the cause picks up where the failed run stopped.

use deck_cluster::local::epoch_secs;
use deck_cluster::{ClusterError, ClusterResult, ControlPlane, ImageBuilder};
use deck_core::{Plan, Reference, Resource, StageConfig};
use deck_state::{
    ApplyOutcome, OutcomeRecord, RunRecord, StageRecord, StageStatus, StateResult, StateStore,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{SequencerError, SequencerResult};
use crate::validate::ValidatePlan;

/// Outcome of [`Sequencer::run`].
#[derive(Debug)]
pub struct RunReport {
    /// Per-stage status and per-entity outcomes, as stored in the ledger.
    pub record: RunRecord,
    /// Why the run stopped early, if it did.
    pub error: Option<SequencerError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.record.stage(stage).map(|s| s.status)
    }

    pub fn into_result(self) -> SequencerResult<RunRecord> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.record),
        }
    }
}

/// Where finished runs are recorded.
pub trait RunLedger {
    /// Store `run` and return the id it was assigned.
    fn record_run(&self, run: &RunRecord) -> StateResult<u64>;
}

impl RunLedger for StateStore {
    fn record_run(&self, run: &RunRecord) -> StateResult<u64> {
        StateStore::record_run(self, run)
    }
}

pub struct Sequencer<'a> {
    plane: &'a dyn ControlPlane,
    builder: &'a dyn ImageBuilder,
    ledger: Option<Box<dyn RunLedger + 'a>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a> Sequencer<'a> {
    pub fn new(plane: &'a dyn ControlPlane, builder: &'a dyn ImageBuilder) -> Self {
        Self {
            plane,
            builder,
            ledger: None,
            shutdown: None,
        }
    }

    /// Record every run in `ledger`.
    pub fn with_ledger(mut self, ledger: impl RunLedger + 'a) -> Self {
        self.ledger = Some(Box::new(ledger));
        self
    }

    /// Stop before the next stage once `shutdown` reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Validate `plan` and return its stages in application order.
    pub fn plan<'p>(&self, plan: &'p Plan) -> SequencerResult<Vec<&'p StageConfig>> {
        let order = plan.validate()?;
        Ok(order.into_iter().map(|i| &plan.stages[i]).collect())
    }

    fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Apply every stage of `plan`.
    ///
    /// Returns `Err` only when the plan is invalid, in which case nothing
    /// is applied. Stage failures and interruption are reported in
    /// [`RunReport::error`]. A run that cannot be recorded keeps id 0; the
    /// ledger failure is reported only if no stage failed first.
    pub fn run(&self, plan: &Plan) -> SequencerResult<RunReport> {
        let stages = self.plan(plan)?;
        let started_at = epoch_secs();
        info!(project = %plan.project.name, stages = stages.len(), "run started");

        let mut records: Vec<StageRecord> = Vec::with_capacity(stages.len());
        let mut error: Option<SequencerError> = None;
        for stage in &stages {
            if error.is_none() && self.interrupted() {
                let completed = records
                    .iter()
                    .map(|r| r.stage.clone())
                    .collect();
                warn!(stage = %stage.name, "interrupted, stopping before stage");
                error = Some(SequencerError::Interrupted { completed });
            }
            if error.is_some() {
                records.push(StageRecord::new(&stage.name, StageStatus::NotAttempted));
                continue;
            }

            let (record, failure) = self.apply_stage(stage);
            if let Some(cause) = failure {
                warn!(stage = %stage.name, error = %cause, "stage failed, halting");
                error = Some(SequencerError::StageApply {
                    stage: stage.name.clone(),
                    cause,
                });
            }
            records.push(record);
        }

        let mut record = RunRecord {
            id: 0,
            project: plan.project.name.clone(),
            started_at,
            finished_at: epoch_secs(),
            stages: records,
            error: error.as_ref().map(|e| e.to_string()),
        };
        if let Some(ledger) = &self.ledger {
            match ledger.record_run(&record) {
                Ok(id) => record.id = id,
                Err(e) => {
                    warn!(error = %e, "could not record run");
                    error.get_or_insert(SequencerError::State(e));
                }
            }
        }
        match &error {
            None => info!(run = record.id, changed = record.changed(), "run completed"),
            Some(e) => warn!(run = record.id, error = %e, "run did not complete"),
        }
        Ok(RunReport { record, error })
    }

    /// Apply one stage. Returns the stage record and the failure, if any.
    fn apply_stage(&self, stage: &StageConfig) -> (StageRecord, Option<ClusterError>) {
        info!(stage = %stage.name, resources = stage.resources.len(), "applying stage");
        let mut record = StageRecord::new(&stage.name, StageStatus::Applied);

        for resource in &stage.resources {
            match self.apply_resource(resource) {
                Ok(outcome) => record.outcomes.push(OutcomeRecord {
                    kind: resource.kind(),
                    name: resource.name().to_string(),
                    outcome,
                }),
                Err(cause) => {
                    record.status = StageStatus::Failed;
                    return (record, Some(cause));
                }
            }
        }

        for action in &stage.exec {
            let command = action.command.join(" ");
            debug!(stage = %stage.name, workload = %action.workload, %command, "running exec action");
            let result = self.plane.exec(&action.workload, &action.command).and_then(|output| {
                if output.success() {
                    Ok(())
                } else {
                    Err(ClusterError::Exec {
                        workload: action.workload.clone(),
                        reason: format!(
                            "`{command}` exited with {}: {}",
                            output.exit_code,
                            output.stderr.trim()
                        ),
                    })
                }
            });
            if let Err(cause) = result {
                record.status = StageStatus::Failed;
                return (record, Some(cause));
            }
            record.execs.push(format!("{}: {command}", action.workload));
        }

        (record, None)
    }

    fn apply_resource(&self, resource: &Resource) -> ClusterResult<ApplyOutcome> {
        match resource {
            Resource::Image(image) => {
                let built = self.builder.build_and_publish(image)?;
                self.plane.apply(&Resource::Image(built))
            }
            other => self.plane.apply(other),
        }
    }

    /// Delete every entity of `plan`, stages in reverse application order
    /// and each stage's entities in reverse declaration order. Returns the
    /// entities that existed and were deleted.
    pub fn teardown(&self, plan: &Plan) -> SequencerResult<Vec<Reference>> {
        let stages = self.plan(plan)?;
        let mut deleted = Vec::new();
        let mut completed = Vec::new();
        for stage in stages.iter().rev() {
            if self.interrupted() {
                warn!(stage = %stage.name, "interrupted, stopping teardown");
                return Err(SequencerError::Interrupted { completed });
            }
            info!(stage = %stage.name, "tearing down stage");
            for resource in stage.resources.iter().rev() {
                let existed = self
                    .plane
                    .delete(resource.kind(), resource.name())
                    .map_err(|cause| SequencerError::StageDelete {
                        stage: stage.name.clone(),
                        cause,
                    })?;
                if existed {
                    deleted.push(resource.id());
                }
            }
            completed.push(stage.name.clone());
        }
        info!(deleted = deleted.len(), "teardown completed");
        Ok(deleted)
    }
}
