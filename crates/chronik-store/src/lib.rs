use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compute a deterministic project ID from a repository root path.
/// project_id = blake3(normalize_path(input)) → hex string (first 32 chars).
pub fn project_id(repo_root: &Path) -> String {
    let normalized = normalize_path(repo_root);
    let hash = blake3::hash(normalized.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Normalize a path: canonicalize, lowercase on Windows, forward slashes.
fn normalize_path(p: &Path) -> String {
    let abs = p
        .canonicalize()
        .unwrap_or_else(|_| p.to_path_buf())
        .to_string_lossy()
        .to_string();
    #[cfg(windows)]
    let abs = abs.to_lowercase();
    abs.replace('\\', "/")
}

/// Return the per-user store root: `~/.local/share/chronik/`
/// (platform data dir via `dirs`), with a relative fallback.
pub fn store_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("chronik")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".chronik")
    } else {
        PathBuf::from(".chronik-store")
    }
}

/// Per-project layout under a store root. Holding the root explicitly
/// (instead of a process-wide default) lets tests and embedders scope
/// all state to a directory of their choosing.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    base: PathBuf,
}

impl ProjectPaths {
    /// Paths under the default per-user store root.
    pub fn new(repo_root: &Path) -> Self {
        Self::under(&store_root(), repo_root)
    }

    /// Paths under an explicit store root.
    pub fn under(root: &Path, repo_root: &Path) -> Self {
        let base = root.join("projects").join(project_id(repo_root));
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Ensure all subdirectories exist for the project.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for sub in ["checkpoints", "knowledge", "sessions", "runs"] {
            fs::create_dir_all(self.base.join(sub))?;
        }
        Ok(())
    }

    /// Batch checkpoint ledger, one file per team.
    pub fn batch_checkpoints(&self, team: &str) -> PathBuf {
        self.base
            .join("checkpoints")
            .join(format!("{team}-batches.json"))
    }

    /// Workflow-level timestamps, one file per team.
    pub fn workflow_checkpoints(&self, team: &str) -> PathBuf {
        self.base
            .join("checkpoints")
            .join(format!("{team}-workflow.json"))
    }

    /// Legacy location: team-scoped knowledge export with embedded metadata.
    pub fn legacy_knowledge_export(&self, team: &str) -> PathBuf {
        self.base.join("knowledge").join(format!("{team}-export.json"))
    }

    /// Legacy location: the old shared memory file.
    pub fn legacy_memory(&self) -> PathBuf {
        self.base.join("memory.json")
    }

    /// Session logs ingested by the session-window extractor.
    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    /// Default progress file for a team's runs (a run config may point
    /// elsewhere; `chronik status` falls back to this convention).
    pub fn progress_file(&self, team: &str) -> PathBuf {
        self.base.join("runs").join(format!("{team}-progress.json"))
    }

    /// Advisory single-writer lock for a team's runs.
    pub fn run_lock(&self, team: &str) -> PathBuf {
        self.base.join("runs").join(format!("{team}.lock"))
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// File-based exclusive lock guard.
pub struct LockGuard {
    _file: fs::File,
}

/// Acquire an exclusive file lock. Creates the lock file if needed.
/// Fails immediately (rather than blocking) when another process holds it.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.try_lock_exclusive()?;
    Ok(LockGuard { _file: file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_is_deterministic() {
        let id1 = project_id(Path::new("/tmp/test-repo"));
        let id2 = project_id(Path::new("/tmp/test-repo"));
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 32);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn paths_are_team_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::under(tmp.path(), Path::new("/tmp/repo"));
        let a = paths.batch_checkpoints("platform");
        let b = paths.batch_checkpoints("infra");
        assert_ne!(a, b);
        assert!(a.ends_with("checkpoints/platform-batches.json"));
        assert!(paths
            .workflow_checkpoints("platform")
            .ends_with("checkpoints/platform-workflow.json"));
        assert!(paths
            .legacy_knowledge_export("platform")
            .ends_with("knowledge/platform-export.json"));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::under(tmp.path(), Path::new("/tmp/repo"));
        paths.ensure_dirs().unwrap();
        for sub in ["checkpoints", "knowledge", "sessions", "runs"] {
            assert!(paths.base().join(sub).is_dir());
        }
    }

    #[test]
    fn write_atomic_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("test.json");
        write_atomic(&path, b"{\"ok\":true}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"ok\":true}");
    }

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn lock_file_acquires_and_drops() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("run.lock");
        let guard = lock_file(&lock_path).unwrap();
        assert!(lock_path.exists());
        drop(guard);
        // Re-acquirable after drop
        let _guard = lock_file(&lock_path).unwrap();
    }
}
