//! redb-backed ledger.
//!
//! Provides typed CRUD over entity records, run history and the exec
//! journal. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing and dry runs).

use std::path::Path;
use std::sync::Arc;

use deck_core::ResourceKind;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe ledger backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory ledger.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for kind in ResourceKind::ALL {
            txn.open_table(resource_table(kind)).map_err(map_err!(Table))?;
        }
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.open_table(EXECS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Entities ───────────────────────────────────────────────────

    /// Insert or replace an entity record.
    pub fn put_resource(&self, record: &ResourceRecord) -> StateResult<()> {
        let kind = record.kind();
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn
                .open_table(resource_table(kind))
                .map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, generation = record.generation, "resource stored");
        Ok(())
    }

    /// Get an entity record by kind and name.
    pub fn get_resource(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> StateResult<Option<ResourceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(resource_table(kind))
            .map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: ResourceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all records of one kind, ordered by name.
    pub fn list_resources(&self, kind: ResourceKind) -> StateResult<Vec<ResourceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(resource_table(kind))
            .map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ResourceRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// List every record, grouped by kind.
    pub fn list_all_resources(&self) -> StateResult<Vec<ResourceRecord>> {
        let mut results = Vec::new();
        for kind in ResourceKind::ALL {
            results.extend(self.list_resources(kind)?);
        }
        Ok(results)
    }

    /// Delete an entity record. Returns true if it existed.
    pub fn delete_resource(&self, kind: ResourceKind, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn
                .open_table(resource_table(kind))
                .map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %name, existed, "resource deleted");
        Ok(existed)
    }

    // ── Runs ───────────────────────────────────────────────────────

    /// Store a run, assigning the next run id. Returns the id.
    pub fn record_run(&self, run: &RunRecord) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id;
        {
            let mut table = txn.open_table(RUNS).map_err(map_err!(Table))?;
            id = next_sequence(&table)?;
            let mut run = run.clone();
            run.id = id;
            let value = serde_json::to_vec(&run).map_err(map_err!(Serialize))?;
            table
                .insert(sequence_key(id).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id, "run recorded");
        Ok(id)
    }

    /// The most recent run, if any.
    pub fn latest_run(&self) -> StateResult<Option<RunRecord>> {
        Ok(self.list_runs(1)?.into_iter().next())
    }

    /// Up to `limit` runs, newest first.
    pub fn list_runs(&self, limit: usize) -> StateResult<Vec<RunRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let run: RunRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(run);
        }
        Ok(results)
    }

    // ── Exec journal ───────────────────────────────────────────────

    /// Append a journal entry, assigning the next sequence number.
    pub fn append_exec(&self, record: &ExecRecord) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(EXECS).map_err(map_err!(Table))?;
            seq = next_sequence(&table)?;
            let mut record = record.clone();
            record.seq = seq;
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(sequence_key(seq).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(seq)
    }

    /// Journal entries for one workload, oldest first.
    pub fn list_execs_for_workload(&self, workload: &str) -> StateResult<Vec<ExecRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EXECS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ExecRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.workload == workload {
                results.push(record);
            }
        }
        Ok(results)
    }
}

/// One past the highest sequence key in `table`, starting at 1.
fn next_sequence(table: &impl ReadableTable<&'static str, &'static [u8]>) -> StateResult<u64> {
    let last = match table.last().map_err(map_err!(Read))? {
        Some((key, _)) => key
            .value()
            .parse::<u64>()
            .map_err(map_err!(Deserialize))?,
        None => 0,
    };
    Ok(last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::*;
    use std::collections::BTreeMap;

    fn test_config(name: &str, value: &str) -> ResourceRecord {
        let mut data = BTreeMap::new();
        data.insert("KEY".to_string(), value.to_string());
        ResourceRecord {
            resource: Resource::Config(ConfigSet {
                name: name.to_string(),
                data,
            }),
            digest: format!("sha256:{value}"),
            generation: 1,
            bound_to: None,
        }
    }

    fn test_run(project: &str, error: Option<&str>) -> RunRecord {
        RunRecord {
            id: 0,
            project: project.to_string(),
            started_at: 1000,
            finished_at: 1001,
            stages: vec![StageRecord::new("config", StageStatus::Applied)],
            error: error.map(str::to_string),
        }
    }

    // ── Entity CRUD ────────────────────────────────────────────────

    #[test]
    fn resource_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let record = test_config("app", "v1");

        store.put_resource(&record).unwrap();
        let retrieved = store.get_resource(ResourceKind::Config, "app").unwrap();

        assert_eq!(retrieved, Some(record));
    }

    #[test]
    fn resource_kinds_are_separate_namespaces() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_resource(&test_config("mysql", "v1")).unwrap();

        assert!(store.get_resource(ResourceKind::Config, "mysql").unwrap().is_some());
        assert!(store.get_resource(ResourceKind::Secret, "mysql").unwrap().is_none());
        assert!(store.get_resource(ResourceKind::Workload, "mysql").unwrap().is_none());
    }

    #[test]
    fn resource_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_resource(&test_config("app", "v1")).unwrap();

        let mut record = test_config("app", "v2");
        record.generation = 2;
        store.put_resource(&record).unwrap();

        let all = store.list_resources(ResourceKind::Config).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].generation, 2);
        assert_eq!(all[0].digest, "sha256:v2");
    }

    #[test]
    fn resource_list_is_ordered_by_name() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_resource(&test_config("b", "1")).unwrap();
        store.put_resource(&test_config("a", "1")).unwrap();
        store.put_resource(&test_config("c", "1")).unwrap();

        let names: Vec<_> = store
            .list_resources(ResourceKind::Config)
            .unwrap()
            .iter()
            .map(|r| r.table_key().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(store.list_all_resources().unwrap().len(), 3);
    }

    #[test]
    fn resource_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_resource(&test_config("app", "v1")).unwrap();

        assert!(store.delete_resource(ResourceKind::Config, "app").unwrap());
        assert!(!store.delete_resource(ResourceKind::Config, "app").unwrap());
        assert!(store.get_resource(ResourceKind::Config, "app").unwrap().is_none());
    }

    // ── Runs ───────────────────────────────────────────────────────

    #[test]
    fn runs_get_sequential_ids_and_list_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.record_run(&test_run("p", None)).unwrap(), 1);
        assert_eq!(store.record_run(&test_run("p", Some("boom"))).unwrap(), 2);
        assert_eq!(store.record_run(&test_run("p", None)).unwrap(), 3);

        let runs = store.list_runs(2).unwrap();
        assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(runs[1].error.as_deref(), Some("boom"));

        let latest = store.latest_run().unwrap().unwrap();
        assert_eq!(latest.id, 3);
        assert!(latest.succeeded());
    }

    #[test]
    fn run_ids_survive_past_nine() {
        let store = StateStore::open_in_memory().unwrap();
        for _ in 0..11 {
            store.record_run(&test_run("p", None)).unwrap();
        }
        assert_eq!(store.latest_run().unwrap().unwrap().id, 11);
    }

    // ── Exec journal ───────────────────────────────────────────────

    #[test]
    fn exec_journal_filters_by_workload() {
        let store = StateStore::open_in_memory().unwrap();
        for workload in ["django", "mysql", "django"] {
            store
                .append_exec(&ExecRecord {
                    seq: 0,
                    workload: workload.to_string(),
                    command: vec!["true".to_string()],
                    exit_code: 0,
                    at: 1000,
                })
                .unwrap();
        }

        let django = store.list_execs_for_workload("django").unwrap();
        assert_eq!(django.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 3]);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_resource(&test_config("app", "v1")).unwrap();
            store.record_run(&test_run("p", None)).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_resource(ResourceKind::Config, "app").unwrap().is_some());
        assert_eq!(store.latest_run().unwrap().unwrap().id, 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_all_resources().unwrap().is_empty());
        assert!(store.latest_run().unwrap().is_none());
        assert!(store.list_execs_for_workload("any").unwrap().is_empty());
        assert!(!store.delete_resource(ResourceKind::Route, "nope").unwrap());
    }
}
