//! Durable ledger of completed batches.
//!
//! The whole store is rewritten to disk (atomic rename) after every
//! mutation, so the file is the single source of truth once a call
//! returns. A failed flush is logged and retried on the next mutation
//! rather than raised into the pipeline.
//!
//! Invariant maintained by every mutation path: `accumulated_stats`
//! equals the element-wise sum of `stats` across `completed_batches`.

use chronik_core::timeutil::now_rfc3339;
use chronik_core::{BatchStats, CommitRange, DateRange};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Record that one batch's processing pipeline returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckpoint {
    pub batch_id: String,
    /// 1-based, unique within a store, increasing in first-recorded order.
    pub batch_number: u64,
    pub completed_at: String,
    pub commit_range: CommitRange,
    pub date_range: DateRange,
    pub stats: BatchStats,
    /// Verbatim step outputs kept for audit/history when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_outputs: Option<serde_json::Value>,
}

/// On-disk shape of the ledger, one file per `(repository, team)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckpointData {
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub repository_path: String,
    #[serde(default)]
    pub last_completed_batch: Option<u64>,
    #[serde(default)]
    pub last_completed_at: Option<String>,
    #[serde(default)]
    pub completed_batches: Vec<BatchCheckpoint>,
    #[serde(default)]
    pub accumulated_stats: BatchStats,
    #[serde(default)]
    pub last_updated: String,
}

pub struct BatchCheckpointStore {
    path: PathBuf,
    team: String,
    repository_path: String,
    cache: Option<BatchCheckpointData>,
}

impl BatchCheckpointStore {
    pub fn new(path: PathBuf, repository_path: String, team: String) -> Self {
        Self {
            path,
            team,
            repository_path,
            cache: None,
        }
    }

    /// Load the ledger, reading the file once and caching in memory.
    ///
    /// Files written before `accumulatedStats` existed are upgraded in
    /// place: the field is recomputed from `completedBatches` and the
    /// upgraded structure persisted: a one-time, transparent migration.
    pub fn load(&mut self) -> &BatchCheckpointData {
        if self.cache.is_none() {
            let loaded = self.read_from_disk();
            self.cache = Some(loaded);
        }
        self.cache.as_ref().expect("cache populated above")
    }

    fn read_from_disk(&mut self) -> BatchCheckpointData {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return self.empty_data(),
        };
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e,
                    "unreadable batch checkpoint file, starting fresh");
                return self.empty_data();
            }
        };
        let needs_migration = value.get("accumulatedStats").is_none();
        let mut data: BatchCheckpointData = match serde_json::from_value(value) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e,
                    "unparseable batch checkpoint file, starting fresh");
                return self.empty_data();
            }
        };
        if needs_migration {
            data.accumulated_stats = BatchStats::sum(data.completed_batches.iter().map(|b| &b.stats));
            data.last_updated = now_rfc3339();
            tracing::info!(path = %self.path.display(),
                "migrated batch checkpoint file: recomputed accumulated stats");
            self.write(&data);
        }
        data
    }

    fn empty_data(&self) -> BatchCheckpointData {
        BatchCheckpointData {
            team: self.team.clone(),
            repository_path: self.repository_path.clone(),
            last_completed_batch: None,
            last_completed_at: None,
            completed_batches: Vec::new(),
            accumulated_stats: BatchStats::default(),
            last_updated: now_rfc3339(),
        }
    }

    /// Record a completed batch. An existing `batch_id` is updated in
    /// place: its previous stats contribution is subtracted before the
    /// new one is added, so totals never double-count. The "latest"
    /// pointer advances only when the saved number is the maximum;
    /// batches may be re-recorded out of numeric order safely.
    pub fn save_batch(&mut self, checkpoint: BatchCheckpoint) {
        self.load();
        let data = self.cache.as_mut().expect("loaded above");

        match data
            .completed_batches
            .iter_mut()
            .find(|b| b.batch_id == checkpoint.batch_id)
        {
            Some(existing) => {
                data.accumulated_stats.subtract_clamped(&existing.stats);
                *existing = checkpoint.clone();
            }
            None => data.completed_batches.push(checkpoint.clone()),
        }
        data.accumulated_stats.add(&checkpoint.stats);

        let max = data
            .completed_batches
            .iter()
            .map(|b| b.batch_number)
            .max();
        if max == Some(checkpoint.batch_number) {
            data.last_completed_batch = Some(checkpoint.batch_number);
            data.last_completed_at = Some(checkpoint.completed_at.clone());
        }
        data.last_updated = now_rfc3339();
        self.flush();
    }

    /// Remove every checkpoint with `batch_number >= n`, subtracting
    /// their stats (clamped at zero), and recompute the latest pointer
    /// from what remains. Used to force reprocessing of a suffix.
    pub fn reset_from_batch(&mut self, n: u64) {
        self.load();
        let data = self.cache.as_mut().expect("loaded above");

        let mut kept = Vec::with_capacity(data.completed_batches.len());
        for batch in data.completed_batches.drain(..) {
            if batch.batch_number >= n {
                data.accumulated_stats.subtract_clamped(&batch.stats);
            } else {
                kept.push(batch);
            }
        }
        data.completed_batches = kept;

        match data
            .completed_batches
            .iter()
            .max_by_key(|b| b.batch_number)
        {
            Some(latest) => {
                data.last_completed_batch = Some(latest.batch_number);
                data.last_completed_at = Some(latest.completed_at.clone());
            }
            None => {
                data.last_completed_batch = None;
                data.last_completed_at = None;
            }
        }
        data.last_updated = now_rfc3339();
        self.flush();
    }

    /// Full reset to the empty state.
    pub fn clear_all(&mut self) {
        self.cache = Some(self.empty_data());
        self.flush();
    }

    /// The checkpoint the latest pointer refers to, if any.
    pub fn last_completed(&mut self) -> Option<BatchCheckpoint> {
        self.load();
        let data = self.cache.as_ref().expect("loaded above");
        let number = data.last_completed_batch?;
        data.completed_batches
            .iter()
            .find(|b| b.batch_number == number)
            .cloned()
    }

    pub fn last_completed_batch(&mut self) -> Option<u64> {
        self.load().last_completed_batch
    }

    pub fn accumulated_stats(&mut self) -> BatchStats {
        self.load().accumulated_stats.clone()
    }

    /// Synchronously rewrite the whole store. Best-effort: a failed
    /// write is logged and implicitly retried on the next mutation,
    /// which rewrites the full current state anyway.
    fn flush(&self) {
        if let Some(data) = &self.cache {
            self.write(data);
        }
    }

    fn write(&self, data: &BatchCheckpointData) {
        let payload = match serde_json::to_vec_pretty(data) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "batch checkpoint serialization failed");
                return;
            }
        };
        if let Err(e) = chronik_store::write_atomic(&self.path, &payload) {
            tracing::warn!(path = %self.path.display(), error = %e,
                "batch checkpoint flush failed, will retry on next mutation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(id: &str, number: u64, commits: u64, entities: u64) -> BatchCheckpoint {
        BatchCheckpoint {
            batch_id: id.to_string(),
            batch_number: number,
            completed_at: format!("2026-01-{:02}T00:00:00Z", number),
            commit_range: CommitRange {
                start: format!("{number:040x}"),
                end: format!("{:040x}", number + 1),
            },
            date_range: DateRange {
                start: "2026-01-01T00:00:00Z".into(),
                end: "2026-01-02T00:00:00Z".into(),
            },
            stats: BatchStats {
                commits,
                entities_created: entities,
                ..Default::default()
            },
            step_outputs: None,
        }
    }

    fn store_in(dir: &std::path::Path) -> BatchCheckpointStore {
        BatchCheckpointStore::new(
            dir.join("batches.json"),
            "/tmp/repo".into(),
            "platform".into(),
        )
    }

    fn assert_invariant(store: &mut BatchCheckpointStore) {
        let data = store.load().clone();
        let expected = BatchStats::sum(data.completed_batches.iter().map(|b| &b.stats));
        assert_eq!(data.accumulated_stats, expected);
    }

    #[test]
    fn two_batches_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.save_batch(checkpoint("b1", 1, 5, 3));
        store.save_batch(checkpoint("b2", 2, 7, 4));

        assert_eq!(store.accumulated_stats().commits, 12);
        assert_eq!(store.accumulated_stats().entities_created, 7);
        assert_eq!(store.last_completed_batch(), Some(2));
        assert_invariant(&mut store);
    }

    #[test]
    fn resave_same_batch_id_does_not_double_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.save_batch(checkpoint("b1", 1, 5, 3));
        store.save_batch(checkpoint("b1", 1, 9, 2));

        let stats = store.accumulated_stats();
        assert_eq!(stats.commits, 9);
        assert_eq!(stats.entities_created, 2);
        assert_eq!(store.load().completed_batches.len(), 1);
        assert_invariant(&mut store);
    }

    #[test]
    fn out_of_order_recording_keeps_latest_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.save_batch(checkpoint("b3", 3, 1, 0));
        store.save_batch(checkpoint("b1", 1, 1, 0));

        // Re-recording an older batch must not regress the pointer
        assert_eq!(store.last_completed_batch(), Some(3));
        assert_eq!(
            store.last_completed().unwrap().batch_id,
            "b3".to_string()
        );
        assert_invariant(&mut store);
    }

    #[test]
    fn reset_then_resave_reproduces_totals() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.save_batch(checkpoint("b1", 1, 5, 3));
        store.save_batch(checkpoint("b2", 2, 7, 4));
        store.save_batch(checkpoint("b3", 3, 2, 1));
        let before = store.accumulated_stats();

        store.reset_from_batch(2);
        assert_eq!(store.last_completed_batch(), Some(1));
        assert_eq!(store.accumulated_stats().commits, 5);
        assert_invariant(&mut store);

        store.save_batch(checkpoint("b2", 2, 7, 4));
        store.save_batch(checkpoint("b3", 3, 2, 1));
        assert_eq!(store.accumulated_stats(), before);
        assert_invariant(&mut store);
    }

    #[test]
    fn reset_everything_clears_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.save_batch(checkpoint("b1", 1, 5, 3));
        store.reset_from_batch(1);

        assert_eq!(store.last_completed_batch(), None);
        assert!(store.accumulated_stats().is_empty());
        assert_invariant(&mut store);
    }

    #[test]
    fn clear_all_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.save_batch(checkpoint("b1", 1, 5, 3));
        store.clear_all();

        let data = store.load();
        assert!(data.completed_batches.is_empty());
        assert_eq!(data.team, "platform");
        assert!(data.accumulated_stats.is_empty());
    }

    #[test]
    fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_in(dir.path());
            store.save_batch(checkpoint("b1", 1, 5, 3));
        }
        let mut reloaded = store_in(dir.path());
        assert_eq!(reloaded.last_completed_batch(), Some(1));
        assert_eq!(reloaded.accumulated_stats().commits, 5);
    }

    #[test]
    fn legacy_file_without_accumulated_stats_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batches.json");

        // Pre-accumulatedStats schema written by an older version
        let legacy = serde_json::json!({
            "team": "platform",
            "repositoryPath": "/tmp/repo",
            "lastCompletedBatch": 2,
            "lastCompletedAt": "2026-01-02T00:00:00Z",
            "completedBatches": [
                {
                    "batchId": "b1", "batchNumber": 1,
                    "completedAt": "2026-01-01T00:00:00Z",
                    "commitRange": {"start": "a", "end": "b"},
                    "dateRange": {"start": "x", "end": "y"},
                    "stats": {"commits": 5, "sessions": 0, "tokensUsed": 0,
                              "entitiesCreated": 3, "entitiesUpdated": 0, "relationsAdded": 0}
                },
                {
                    "batchId": "b2", "batchNumber": 2,
                    "completedAt": "2026-01-02T00:00:00Z",
                    "commitRange": {"start": "b", "end": "c"},
                    "dateRange": {"start": "x", "end": "y"},
                    "stats": {"commits": 7, "sessions": 0, "tokensUsed": 0,
                              "entitiesCreated": 4, "entitiesUpdated": 0, "relationsAdded": 0}
                }
            ]
        });
        std::fs::write(&path, serde_json::to_string_pretty(&legacy).unwrap()).unwrap();

        let mut store =
            BatchCheckpointStore::new(path.clone(), "/tmp/repo".into(), "platform".into());
        assert_eq!(store.accumulated_stats().commits, 12);
        assert_invariant(&mut store);

        // The upgraded structure was persisted
        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["accumulatedStats"]["commits"], 12);
    }

    #[test]
    fn flush_failure_does_not_poison_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is actually a file, so every write fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a dir").unwrap();
        let mut store = BatchCheckpointStore::new(
            blocker.join("batches.json"),
            "/tmp/repo".into(),
            "platform".into(),
        );

        store.save_batch(checkpoint("b1", 1, 5, 3));
        // In-memory state stays consistent despite the failed flush
        assert_eq!(store.accumulated_stats().commits, 5);
        assert_invariant(&mut store);
    }
}
