//! Static plan validation.
//!
//! Runs before anything is applied. Checks, in order: unique stage names,
//! unique entities across the plan, unique check names, known dependencies,
//! acyclicity, entity names and secret encodings, and that every reference
//! is provided by the referencing stage or by a stage it depends on.

use std::collections::{HashMap, HashSet};

use deck_core::names::is_valid_name;
use deck_core::{Plan, Reference, Resource, ResourceKind};

use crate::error::{SequencerError, SequencerResult};
use crate::graph::StageGraph;

/// Validation for [`Plan`].
pub trait ValidatePlan {
    /// Validate the plan and return its stage indices in application order.
    fn validate(&self) -> SequencerResult<Vec<usize>>;
}

impl ValidatePlan for Plan {
    fn validate(&self) -> SequencerResult<Vec<usize>> {
        let mut seen_stages = HashSet::new();
        for stage in &self.stages {
            if !seen_stages.insert(stage.name.as_str()) {
                return Err(SequencerError::DuplicateStage(stage.name.clone()));
            }
        }

        let mut declared: HashMap<Reference, &str> = HashMap::new();
        for stage in &self.stages {
            for resource in &stage.resources {
                if let Some(first) = declared.insert(resource.id(), &stage.name) {
                    return Err(SequencerError::DuplicateResource {
                        resource: resource.id(),
                        first: first.to_string(),
                        second: stage.name.clone(),
                    });
                }
            }
        }

        let mut seen_checks = HashSet::new();
        for check in &self.checks {
            if !seen_checks.insert(check.name()) {
                return Err(SequencerError::DuplicateCheck(check.name().to_string()));
            }
        }

        let graph = StageGraph::new(&self.stages)?;
        let order = graph.order()?;

        for &i in &order {
            let stage = graph.stage(i);
            for resource in &stage.resources {
                if !is_valid_name(resource.name()) {
                    return Err(SequencerError::InvalidName {
                        stage: stage.name.clone(),
                        kind: resource.kind(),
                        name: resource.name().to_string(),
                    });
                }
                if let Resource::Secret(secret) = resource {
                    if let Some(key) = secret.malformed_key() {
                        return Err(SequencerError::MalformedSecret {
                            stage: stage.name.clone(),
                            resource: resource.id(),
                            key: key.to_string(),
                        });
                    }
                }
            }
        }

        for &i in &order {
            let stage = graph.stage(i);
            let provided: HashSet<Reference> = graph
                .closure(i)
                .into_iter()
                .flat_map(|j| graph.stage(j).resources.iter().map(|r| r.id()))
                .collect();

            let exec_targets = stage
                .exec
                .iter()
                .map(|action| Reference::new(ResourceKind::Workload, &action.workload));
            let references = stage
                .resources
                .iter()
                .flat_map(|r| r.references())
                .chain(exec_targets);
            for reference in references {
                if !provided.contains(&reference) {
                    return Err(SequencerError::MissingDependency {
                        stage: stage.name.clone(),
                        reference,
                    });
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::guide::*;
    use deck_core::{ConfigSet, StageConfig};
    use std::collections::BTreeMap;

    fn stage_names(plan: &Plan, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| plan.stages[i].name.clone()).collect()
    }

    #[test]
    fn guide_plan_is_valid() {
        let plan = Plan::guide("someone");
        let order = plan.validate().unwrap();
        assert_eq!(
            stage_names(&plan, &order),
            vec![
                "image",
                "storage",
                "secret",
                "config",
                "database",
                "application",
                "exposure",
                "autoscale",
                "migrate"
            ]
        );
    }

    #[test]
    fn omitted_secret_stage_is_a_missing_dependency() {
        let mut plan = Plan::guide("someone");
        plan.stages.retain(|s| s.name != "secret");
        for stage in &mut plan.stages {
            stage.depends_on.retain(|d| d != "secret");
        }

        match plan.validate().unwrap_err() {
            SequencerError::MissingDependency { stage, reference } => {
                assert_eq!(stage, "database");
                assert_eq!(reference, Reference::new(ResourceKind::Secret, SECRET_NAME));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reference_to_unrelated_stage_is_rejected() {
        // `exposure` no longer depends on `application`, so the route's
        // address is not guaranteed to exist.
        let mut plan = Plan::guide("someone");
        plan.stage_mut("exposure").unwrap().depends_on.clear();
        assert!(matches!(
            plan.validate(),
            Err(SequencerError::MissingDependency { ref stage, .. }) if stage == "exposure"
        ));
    }

    #[test]
    fn exec_target_must_be_provided() {
        let mut plan = Plan::guide("someone");
        plan.stage_mut("migrate").unwrap().depends_on = vec!["database".to_string()];
        match plan.validate().unwrap_err() {
            SequencerError::MissingDependency { stage, reference } => {
                assert_eq!(stage, "migrate");
                assert_eq!(reference, Reference::new(ResourceKind::Workload, APP_WORKLOAD));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_resource_across_stages() {
        let mut plan = Plan::guide("someone");
        plan.stages.push(StageConfig {
            name: "extra".to_string(),
            depends_on: vec![],
            resources: vec![Resource::Config(ConfigSet {
                name: CONFIG_NAME.to_string(),
                data: BTreeMap::new(),
            })],
            exec: vec![],
        });
        assert!(matches!(
            plan.validate(),
            Err(SequencerError::DuplicateResource { ref first, ref second, .. })
                if first == "config" && second == "extra"
        ));
    }

    #[test]
    fn invalid_entity_name() {
        let mut plan = Plan::guide("someone");
        plan.stage_mut("config").unwrap().resources = vec![Resource::Config(ConfigSet {
            name: "Django_Config".to_string(),
            data: BTreeMap::new(),
        })];
        assert!(matches!(
            plan.validate(),
            Err(SequencerError::InvalidName { ref stage, .. }) if stage == "config"
        ));
    }

    #[test]
    fn secret_with_bad_hex_is_rejected() {
        let mut plan = Plan::guide("someone");
        if let Some(Resource::Secret(secret)) = plan
            .stage_mut("secret")
            .and_then(|s| s.resources.first_mut())
        {
            secret
                .binary_data
                .insert("tls-key".to_string(), "not-hex".to_string());
        }
        match plan.validate().unwrap_err() {
            SequencerError::MalformedSecret { stage, key, .. } => {
                assert_eq!(stage, "secret");
                assert_eq!(key, "tls-key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn check_names_are_unique() {
        let mut plan = Plan::guide("someone");
        let first = plan.checks[0].clone();
        plan.checks.push(first);
        assert!(matches!(
            plan.validate(),
            Err(SequencerError::DuplicateCheck(ref name)) if name == "database-connectivity"
        ));
    }

    #[test]
    fn cycle_is_reported_before_references() {
        let mut plan = Plan::guide("someone");
        plan.stage_mut("image")
            .unwrap()
            .depends_on
            .push("exposure".to_string());
        assert!(matches!(
            plan.validate(),
            Err(SequencerError::CyclicDependency { .. })
        ));
    }
}
