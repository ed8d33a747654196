//! File-based status channel between the supervisor and external readers.
//!
//! The dashboard/CLI may set its own fields in the progress file
//! (pause/mock/debug flags). The supervisor does not own those, so every
//! write is a read-modify-merge-write: unknown fields are captured on
//! load and re-written verbatim, never clobbered.

use chronik_core::timeutil::now_rfc3339;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub current_batch: u64,
    pub total_batches: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub workflow_id: String,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_progress: Option<BatchProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: String,
    pub last_update: String,
    pub elapsed_seconds: u64,
    pub pid: u32,
    /// Externally-owned fields, preserved verbatim across rewrites.
    #[serde(flatten)]
    pub external: serde_json::Map<String, serde_json::Value>,
}

/// Writer half of the channel, carrying the run identity so heartbeat
/// ticks and status transitions share one merge path.
#[derive(Debug, Clone)]
pub struct ProgressWriter {
    path: PathBuf,
    workflow_id: String,
    start_time: String,
    started: Instant,
    pid: u32,
}

impl ProgressWriter {
    pub fn new(path: PathBuf, workflow_id: String) -> Self {
        Self {
            path,
            workflow_id,
            start_time: now_rfc3339(),
            started: Instant::now(),
            pid: std::process::id(),
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn read(&self) -> Option<ProgressRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Read-modify-merge-write. Best-effort: the channel is advisory,
    /// so a failed write is logged, not raised.
    pub fn write(&self, f: impl FnOnce(&mut ProgressRecord)) {
        let mut record = self.read().unwrap_or_else(|| self.base_record());
        // Identity fields are supervisor-owned on every write
        record.workflow_id = self.workflow_id.clone();
        record.start_time = self.start_time.clone();
        record.pid = self.pid;
        f(&mut record);
        record.elapsed_seconds = self.elapsed_seconds();
        record.last_update = now_rfc3339();

        match serde_json::to_vec_pretty(&record) {
            Ok(payload) => {
                if let Err(e) = chronik_store::write_atomic(&self.path, &payload) {
                    tracing::warn!(path = %self.path.display(), error = %e,
                        "progress write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "progress serialization failed"),
        }
    }

    fn base_record(&self) -> ProgressRecord {
        ProgressRecord {
            workflow_id: self.workflow_id.clone(),
            status: ProgressStatus::Starting,
            current_step: None,
            steps_completed: None,
            total_steps: None,
            batch_progress: None,
            message: None,
            error: None,
            start_time: self.start_time.clone(),
            last_update: self.start_time.clone(),
            elapsed_seconds: 0,
            pid: self.pid,
            external: serde_json::Map::new(),
        }
    }
}
