pub mod apply;
pub mod delete;
pub mod env;
pub mod init;
pub mod plan;
pub mod render;
pub mod route;
pub mod status;
pub mod verify;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use deck_cluster::LocalCluster;
use deck_core::Plan;
use deck_state::StateStore;
use tracing::debug;

/// Paths shared by every command.
pub struct Context {
    pub plan_path: PathBuf,
    pub state_path: PathBuf,
}

impl Context {
    pub fn new(plan_path: PathBuf, state_path: PathBuf) -> Self {
        Self {
            plan_path,
            state_path,
        }
    }

    pub fn load_plan(&self) -> anyhow::Result<Plan> {
        Plan::from_file(&self.plan_path)
    }

    /// Directory build contexts are resolved against.
    pub fn plan_dir(&self) -> &Path {
        match self.plan_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    pub fn open_store(&self) -> anyhow::Result<StateStore> {
        if let Some(dir) = self.state_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        let store = StateStore::open(&self.state_path)
            .with_context(|| format!("opening ledger {}", self.state_path.display()))?;
        debug!(path = ?self.state_path, "ledger opened");
        Ok(store)
    }

    pub fn open_cluster(&self) -> anyhow::Result<LocalCluster> {
        Ok(LocalCluster::new(self.open_store()?))
    }
}
