//! Explicit registry of checkpoint store handles.
//!
//! Stores are keyed by `(repository_path, team)`: every call site
//! sharing that key must observe the same in-memory state, otherwise two
//! parts of one process could diverge on what "last analyzed" means.
//! The registry is scoped to an application context (CLI run, test)
//! rather than being process-global; tests construct fresh registries.

use crate::batch::BatchCheckpointStore;
use crate::workflow::WorkflowCheckpointStore;
use chronik_store::ProjectPaths;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type Key = (String, String);

pub struct CheckpointRegistry {
    root: PathBuf,
    batch: Mutex<HashMap<Key, Arc<Mutex<BatchCheckpointStore>>>>,
    workflow: Mutex<HashMap<Key, Arc<WorkflowCheckpointStore>>>,
}

impl CheckpointRegistry {
    /// Registry under the default per-user store root.
    pub fn new() -> Self {
        Self::with_root(chronik_store::store_root())
    }

    /// Registry under an explicit store root (tests, embedders).
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            batch: Mutex::new(HashMap::new()),
            workflow: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_paths(&self, repo: &Path) -> ProjectPaths {
        ProjectPaths::under(&self.root, repo)
    }

    /// Shared batch ledger handle for `(repo, team)`.
    pub fn batch_store(&self, repo: &Path, team: &str) -> Arc<Mutex<BatchCheckpointStore>> {
        let key = self.key(repo, team);
        let mut map = self.batch.lock().unwrap();
        map.entry(key)
            .or_insert_with(|| {
                let paths = self.project_paths(repo);
                Arc::new(Mutex::new(BatchCheckpointStore::new(
                    paths.batch_checkpoints(team),
                    repo.to_string_lossy().to_string(),
                    team.to_string(),
                )))
            })
            .clone()
    }

    /// Shared workflow checkpoint handle for `(repo, team)`.
    pub fn workflow_store(&self, repo: &Path, team: &str) -> Arc<WorkflowCheckpointStore> {
        let key = self.key(repo, team);
        let mut map = self.workflow.lock().unwrap();
        map.entry(key)
            .or_insert_with(|| {
                let paths = self.project_paths(repo);
                Arc::new(WorkflowCheckpointStore::new(
                    paths.workflow_checkpoints(team),
                    paths.legacy_knowledge_export(team),
                    paths.legacy_memory(),
                ))
            })
            .clone()
    }

    fn key(&self, repo: &Path, team: &str) -> Key {
        (chronik_store::project_id(repo), team.to_string())
    }
}

impl Default for CheckpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchCheckpoint;
    use chronik_core::{BatchStats, CommitRange, DateRange};

    fn checkpoint(number: u64) -> BatchCheckpoint {
        BatchCheckpoint {
            batch_id: format!("b{number}"),
            batch_number: number,
            completed_at: "2026-01-01T00:00:00Z".into(),
            commit_range: CommitRange {
                start: "a".into(),
                end: "b".into(),
            },
            date_range: DateRange {
                start: "x".into(),
                end: "y".into(),
            },
            stats: BatchStats {
                commits: 1,
                ..Default::default()
            },
            step_outputs: None,
        }
    }

    #[test]
    fn same_key_returns_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CheckpointRegistry::with_root(dir.path().to_path_buf());
        let repo = Path::new("/tmp/repo");

        let a = registry.batch_store(repo, "platform");
        let b = registry.batch_store(repo, "platform");
        assert!(Arc::ptr_eq(&a, &b));

        // A write through one handle is visible through the other
        a.lock().unwrap().save_batch(checkpoint(1));
        assert_eq!(b.lock().unwrap().last_completed_batch(), Some(1));
    }

    #[test]
    fn different_teams_get_distinct_stores() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CheckpointRegistry::with_root(dir.path().to_path_buf());
        let repo = Path::new("/tmp/repo");

        let a = registry.batch_store(repo, "platform");
        let b = registry.batch_store(repo, "infra");
        assert!(!Arc::ptr_eq(&a, &b));

        a.lock().unwrap().save_batch(checkpoint(1));
        assert_eq!(b.lock().unwrap().last_completed_batch(), None);
    }

    #[test]
    fn fresh_registry_reads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Path::new("/tmp/repo");
        {
            let registry = CheckpointRegistry::with_root(dir.path().to_path_buf());
            let store = registry.batch_store(repo, "platform");
            store.lock().unwrap().save_batch(checkpoint(1));
        }
        let registry = CheckpointRegistry::with_root(dir.path().to_path_buf());
        let store = registry.batch_store(repo, "platform");
        assert_eq!(store.lock().unwrap().last_completed_batch(), Some(1));
    }
}
