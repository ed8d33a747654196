use serde::{Deserialize, Serialize};

// ── Commit records ──

/// One extracted commit, oldest-first within a range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    /// RFC-3339 author date as reported by git.
    pub date: String,
    pub message: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub stats: DiffStats,
}

/// Per-file change within a commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    /// Git name-status letter: A, M, D, R, ...
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub files_changed: u64,
    pub additions: u64,
    pub deletions: u64,
}

// ── Session records ──

/// One session log file discovered inside a date window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub path: String,
    pub session_id: String,
    /// RFC-3339 start timestamp of the session.
    pub started_at: String,
    /// Number of JSONL entries in the file.
    pub entries: u64,
}

// ── Ranges ──

/// Inclusive SHA range of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitRange {
    pub start: String,
    pub end: String,
}

/// RFC-3339 date range of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl CommitRecord {
    /// True when every touched file is documentation (content policy:
    /// such commits carry no knowledge-graph signal and are filtered).
    pub fn is_documentation_only(&self) -> bool {
        !self.files.is_empty()
            && self.files.iter().all(|f| {
                let p = f.path.to_ascii_lowercase();
                p.ends_with(".md")
                    || p.ends_with(".rst")
                    || p.ends_with(".txt")
                    || p.starts_with("docs/")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_with_files(paths: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: "abc123".into(),
            author: "Test".into(),
            date: "2026-01-01T00:00:00Z".into(),
            message: "msg".into(),
            files: paths
                .iter()
                .map(|p| FileChange {
                    path: p.to_string(),
                    status: "M".into(),
                    additions: 1,
                    deletions: 0,
                })
                .collect(),
            stats: DiffStats::default(),
        }
    }

    #[test]
    fn docs_only_commit_detected() {
        assert!(commit_with_files(&["README.md", "docs/guide.txt"]).is_documentation_only());
        assert!(commit_with_files(&["CHANGELOG.rst"]).is_documentation_only());
    }

    #[test]
    fn mixed_commit_not_docs_only() {
        assert!(!commit_with_files(&["README.md", "src/main.rs"]).is_documentation_only());
    }

    #[test]
    fn empty_commit_not_docs_only() {
        assert!(!commit_with_files(&[]).is_documentation_only());
    }

    #[test]
    fn commit_record_roundtrip_camel_case() {
        let c = commit_with_files(&["src/lib.rs"]);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains(r#""files":"#));
        assert!(json.contains(r#""filesChanged":"#));
        let back: CommitRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
