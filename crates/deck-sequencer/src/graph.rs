//! Stage dependency graph.
//!
//! Stages are ordered with Kahn's algorithm. When several stages are ready
//! at once the one declared first goes first, so a plan always produces the
//! same order.

use std::collections::{BTreeSet, HashMap};

use deck_core::StageConfig;

use crate::error::{SequencerError, SequencerResult};

/// Indexed view of a plan's stages and their dependency edges.
#[derive(Debug)]
pub struct StageGraph<'a> {
    stages: &'a [StageConfig],
    /// `deps[i]` holds the indices of the stages stage `i` depends on.
    deps: Vec<Vec<usize>>,
}

impl<'a> StageGraph<'a> {
    /// Build the graph. Fails on duplicate stage names and on dependencies
    /// naming stages that do not exist.
    pub fn new(stages: &'a [StageConfig]) -> SequencerResult<Self> {
        let mut index = HashMap::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.name.as_str(), i).is_some() {
                return Err(SequencerError::DuplicateStage(stage.name.clone()));
            }
        }

        let mut deps = Vec::with_capacity(stages.len());
        for stage in stages {
            let mut edges = Vec::with_capacity(stage.depends_on.len());
            for dependency in &stage.depends_on {
                let Some(&j) = index.get(dependency.as_str()) else {
                    return Err(SequencerError::UnknownStage {
                        stage: stage.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if !edges.contains(&j) {
                    edges.push(j);
                }
            }
            deps.push(edges);
        }
        Ok(Self { stages, deps })
    }

    pub fn stage(&self, i: usize) -> &'a StageConfig {
        &self.stages[i]
    }

    /// Stage indices in application order.
    pub fn order(&self) -> SequencerResult<Vec<usize>> {
        let n = self.stages.len();
        let mut in_degree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); n];
        for (i, edges) in self.deps.iter().enumerate() {
            for &j in edges {
                dependents[j].push(i);
            }
        }

        // Ordered by index, which is declaration order.
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &k in &dependents[i] {
                in_degree[k] -= 1;
                if in_degree[k] == 0 {
                    ready.insert(k);
                }
            }
        }

        if order.len() < n {
            let stages = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.stages[i].name.clone())
                .collect();
            return Err(SequencerError::CyclicDependency { stages });
        }
        Ok(order)
    }

    /// Stage `i` and every stage it depends on, directly or transitively.
    pub fn closure(&self, i: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![i];
        while let Some(j) = stack.pop() {
            if seen.insert(j) {
                stack.extend(self.deps[j].iter().copied());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, depends_on: &[&str]) -> StageConfig {
        StageConfig {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            resources: vec![],
            exec: vec![],
        }
    }

    fn names(stages: &[StageConfig], order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| stages[i].name.clone()).collect()
    }

    #[test]
    fn orders_by_dependency_then_declaration() {
        let stages = vec![
            stage("application", &["database", "image"]),
            stage("image", &[]),
            stage("database", &["storage"]),
            stage("storage", &[]),
        ];
        let graph = StageGraph::new(&stages).unwrap();
        let order = graph.order().unwrap();
        assert_eq!(
            names(&stages, &order),
            vec!["image", "storage", "database", "application"]
        );
    }

    #[test]
    fn detects_cycles() {
        let stages = vec![
            stage("a", &["c"]),
            stage("b", &["a"]),
            stage("c", &["b"]),
            stage("d", &[]),
        ];
        let err = StageGraph::new(&stages).unwrap().order().unwrap_err();
        match err {
            SequencerError::CyclicDependency { stages } => assert_eq!(stages, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let stages = vec![stage("a", &["a"])];
        assert!(matches!(
            StageGraph::new(&stages).unwrap().order(),
            Err(SequencerError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn rejects_unknown_and_duplicate_stages() {
        let stages = vec![stage("a", &["missing"])];
        assert!(matches!(
            StageGraph::new(&stages),
            Err(SequencerError::UnknownStage { ref dependency, .. }) if dependency == "missing"
        ));

        let stages = vec![stage("a", &[]), stage("a", &[])];
        assert!(matches!(
            StageGraph::new(&stages),
            Err(SequencerError::DuplicateStage(ref name)) if name == "a"
        ));
    }

    #[test]
    fn closure_is_transitive() {
        let stages = vec![
            stage("storage", &[]),
            stage("database", &["storage"]),
            stage("application", &["database"]),
            stage("other", &[]),
        ];
        let graph = StageGraph::new(&stages).unwrap();
        assert_eq!(graph.closure(2).into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(graph.closure(3).into_iter().collect::<Vec<_>>(), vec![3]);
    }
}
