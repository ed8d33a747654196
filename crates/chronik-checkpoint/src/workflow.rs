//! Coarse workflow-level timestamps.
//!
//! These decide where an incremental run starts. The dedicated file is
//! authoritative; two legacy locations are consulted read-only as
//! fallbacks: the team-scoped knowledge export (which embeds the
//! timestamps under `metadata`) and the old shared memory file (which
//! carried a single `lastAnalysis` value).

use chronik_core::timeutil::now_rfc3339;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    SessionAnalysis,
    GitAnalysis,
    RunCompletion,
}

impl CheckpointKind {
    fn json_key(self) -> &'static str {
        match self {
            CheckpointKind::SessionAnalysis => "lastSessionAnalysis",
            CheckpointKind::GitAnalysis => "lastGitAnalysis",
            CheckpointKind::RunCompletion => "lastRunCompletion",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCheckpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_git_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_completion: Option<String>,
    #[serde(default)]
    pub last_updated: String,
}

impl WorkflowCheckpoints {
    fn get(&self, kind: CheckpointKind) -> Option<&String> {
        match kind {
            CheckpointKind::SessionAnalysis => self.last_session_analysis.as_ref(),
            CheckpointKind::GitAnalysis => self.last_git_analysis.as_ref(),
            CheckpointKind::RunCompletion => self.last_run_completion.as_ref(),
        }
    }

    fn set(&mut self, kind: CheckpointKind, ts: String) {
        match kind {
            CheckpointKind::SessionAnalysis => self.last_session_analysis = Some(ts),
            CheckpointKind::GitAnalysis => self.last_git_analysis = Some(ts),
            CheckpointKind::RunCompletion => self.last_run_completion = Some(ts),
        }
    }
}

pub struct WorkflowCheckpointStore {
    path: PathBuf,
    legacy_export: PathBuf,
    legacy_memory: PathBuf,
}

impl WorkflowCheckpointStore {
    pub fn new(path: PathBuf, legacy_export: PathBuf, legacy_memory: PathBuf) -> Self {
        Self {
            path,
            legacy_export,
            legacy_memory,
        }
    }

    /// Read one timestamp: dedicated file first, then legacy locations
    /// in fixed priority order. Legacy files are never mutated here.
    pub fn get(&self, kind: CheckpointKind) -> Option<String> {
        if let Some(ts) = self.load().get(kind) {
            return Some(ts.clone());
        }
        self.get_legacy(kind)
    }

    /// Record a timestamp at a pipeline milestone.
    pub fn set(&self, kind: CheckpointKind, ts: &str) -> anyhow::Result<()> {
        let mut checkpoints = self.load();
        checkpoints.set(kind, ts.to_string());
        checkpoints.last_updated = now_rfc3339();
        self.write(&checkpoints)
    }

    /// Copy legacy values not already present into the dedicated file.
    /// Idempotent: keys that have been migrated are left untouched on
    /// subsequent calls. Returns true if anything was copied.
    pub fn migrate_from_legacy(&self) -> anyhow::Result<bool> {
        let mut checkpoints = self.load();
        let mut changed = false;
        for kind in [
            CheckpointKind::SessionAnalysis,
            CheckpointKind::GitAnalysis,
            CheckpointKind::RunCompletion,
        ] {
            if checkpoints.get(kind).is_none() {
                if let Some(ts) = self.get_legacy(kind) {
                    checkpoints.set(kind, ts);
                    changed = true;
                }
            }
        }
        if changed {
            checkpoints.last_updated = now_rfc3339();
            self.write(&checkpoints)?;
            tracing::info!(path = %self.path.display(), "migrated legacy workflow checkpoints");
        }
        Ok(changed)
    }

    /// The default starting point of an incremental run. A successful
    /// full completion is a corroborated signal (extraction AND
    /// downstream persistence succeeded) and outranks a bare
    /// git-analysis timestamp, which only proves extraction ran.
    pub fn effective_start(&self) -> Option<String> {
        self.get(CheckpointKind::RunCompletion)
            .or_else(|| self.get(CheckpointKind::GitAnalysis))
    }

    fn load(&self) -> WorkflowCheckpoints {
        read_json(&self.path)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn get_legacy(&self, kind: CheckpointKind) -> Option<String> {
        // Priority 1: knowledge export metadata
        if let Some(v) = read_json(&self.legacy_export) {
            if let Some(ts) = v
                .get("metadata")
                .and_then(|m| m.get(kind.json_key()))
                .and_then(|t| t.as_str())
            {
                return Some(ts.to_string());
            }
        }
        // Priority 2: old shared memory file, git analysis only
        if kind == CheckpointKind::GitAnalysis {
            if let Some(v) = read_json(&self.legacy_memory) {
                if let Some(ts) = v.get("lastAnalysis").and_then(|t| t.as_str()) {
                    return Some(ts.to_string());
                }
            }
        }
        None
    }

    fn write(&self, checkpoints: &WorkflowCheckpoints) -> anyhow::Result<()> {
        let payload = serde_json::to_vec_pretty(checkpoints)?;
        chronik_store::write_atomic(&self.path, &payload)
    }
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> WorkflowCheckpointStore {
        WorkflowCheckpointStore::new(
            dir.join("workflow.json"),
            dir.join("platform-export.json"),
            dir.join("memory.json"),
        )
    }

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .set(CheckpointKind::GitAnalysis, "2026-02-01T00:00:00Z")
            .unwrap();
        assert_eq!(
            store.get(CheckpointKind::GitAnalysis).as_deref(),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(store.get(CheckpointKind::RunCompletion), None);
    }

    #[test]
    fn falls_back_to_knowledge_export() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(
            dir.path().join("platform-export.json"),
            r#"{"entities": [], "metadata": {"lastGitAnalysis": "2025-12-01T00:00:00Z"}}"#,
        )
        .unwrap();

        assert_eq!(
            store.get(CheckpointKind::GitAnalysis).as_deref(),
            Some("2025-12-01T00:00:00Z")
        );
        // The legacy file is not rewritten by reads
        assert!(!dir.path().join("workflow.json").exists());
    }

    #[test]
    fn memory_file_is_lowest_priority() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(
            dir.path().join("memory.json"),
            r#"{"lastAnalysis": "2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("platform-export.json"),
            r#"{"metadata": {"lastGitAnalysis": "2025-06-01T00:00:00Z"}}"#,
        )
        .unwrap();

        assert_eq!(
            store.get(CheckpointKind::GitAnalysis).as_deref(),
            Some("2025-06-01T00:00:00Z")
        );
    }

    #[test]
    fn dedicated_file_outranks_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(
            dir.path().join("memory.json"),
            r#"{"lastAnalysis": "2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        store
            .set(CheckpointKind::GitAnalysis, "2026-03-01T00:00:00Z")
            .unwrap();

        assert_eq!(
            store.get(CheckpointKind::GitAnalysis).as_deref(),
            Some("2026-03-01T00:00:00Z")
        );
    }

    #[test]
    fn migrate_copies_once_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(
            dir.path().join("platform-export.json"),
            r#"{"metadata": {"lastGitAnalysis": "2025-12-01T00:00:00Z",
                             "lastRunCompletion": "2025-11-01T00:00:00Z"}}"#,
        )
        .unwrap();

        assert!(store.migrate_from_legacy().unwrap());
        assert_eq!(
            store.get(CheckpointKind::RunCompletion).as_deref(),
            Some("2025-11-01T00:00:00Z")
        );

        // Later writes win over legacy; a second migrate is a no-op
        store
            .set(CheckpointKind::GitAnalysis, "2026-01-01T00:00:00Z")
            .unwrap();
        assert!(!store.migrate_from_legacy().unwrap());
        assert_eq!(
            store.get(CheckpointKind::GitAnalysis).as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn completion_outranks_git_analysis_for_effective_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .set(CheckpointKind::GitAnalysis, "2026-02-01T00:00:00Z")
            .unwrap();
        assert_eq!(
            store.effective_start().as_deref(),
            Some("2026-02-01T00:00:00Z")
        );

        // An older completion still wins: it is the corroborated signal
        store
            .set(CheckpointKind::RunCompletion, "2026-01-15T00:00:00Z")
            .unwrap();
        assert_eq!(
            store.effective_start().as_deref(),
            Some("2026-01-15T00:00:00Z")
        );
    }

    #[test]
    fn empty_store_has_no_effective_start() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(dir.path()).effective_start(), None);
    }
}
