//! deck.toml plan file parser.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::Resource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub project: ProjectConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

/// One stage: a group of entities applied together, after every stage in
/// `depends_on` has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Commands run in workloads once the stage's entities are applied.
    #[serde(default)]
    pub exec: Vec<ExecAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecAction {
    pub workload: String,
    pub command: Vec<String>,
}

/// Post-deployment verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckConfig {
    /// The application's database env bindings point at a live address,
    /// and a connectivity command succeeds inside the application.
    Database {
        name: String,
        workload: String,
        host_env: String,
        port_env: String,
        #[serde(default)]
        command: Option<Vec<String>>,
    },
    /// The route resolves to its address, which targets a live workload.
    Route { name: String, route: String },
    /// A command exits successfully inside a workload.
    Exec {
        name: String,
        workload: String,
        command: Vec<String>,
    },
}

impl CheckConfig {
    pub fn name(&self) -> &str {
        match self {
            CheckConfig::Database { name, .. }
            | CheckConfig::Route { name, .. }
            | CheckConfig::Exec { name, .. } => name,
        }
    }
}

impl Plan {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing plan {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let plan: Plan = toml::from_str(content)?;
        plan.version()?;
        Ok(plan)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The project version, which must be valid semver.
    pub fn version(&self) -> anyhow::Result<semver::Version> {
        semver::Version::parse(&self.project.version)
            .with_context(|| format!("invalid project version `{}`", self.project.version))
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageConfig> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Every entity in the plan, in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.stages.iter().flat_map(|s| s.resources.iter())
    }

    pub fn find_resource(&self, kind: crate::ResourceKind, name: &str) -> Option<&Resource> {
        self.resources()
            .find(|r| r.kind() == kind && r.name() == name)
    }
}
