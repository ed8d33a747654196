//! Session-log discovery inside a date window.
//!
//! Session files are JSONL, one per session, named `<session_id>.jsonl`.
//! The start timestamp comes from the first record line (`ts` or
//! `timestamp` field), falling back to the file's mtime.

use crate::error::RangeExtractionError;
use chronik_core::timeutil::ts_le;
use chronik_core::{DateRange, SessionRecord};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Return sessions whose start timestamp falls inside `window`
/// (inclusive), oldest first. A missing directory yields an empty list.
pub fn extract_sessions(
    dir: &Path,
    window: &DateRange,
) -> Result<Vec<SessionRecord>, RangeExtractionError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| RangeExtractionError::SessionScan {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut sessions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RangeExtractionError::SessionScan {
            dir: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        match read_session(&path) {
            Some(session) => {
                if ts_le(&window.start, &session.started_at)
                    && ts_le(&session.started_at, &window.end)
                {
                    sessions.push(session);
                }
            }
            None => tracing::warn!(path = %path.display(), "skipping unreadable session file"),
        }
    }

    sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    Ok(sessions)
}

fn read_session(path: &Path) -> Option<SessionRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    let started_at = lines
        .first()
        .and_then(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .and_then(|v| {
            v.get("ts")
                .or_else(|| v.get("timestamp"))
                .and_then(|t| t.as_str())
                .map(String::from)
        })
        .or_else(|| mtime_rfc3339(path))?;

    let session_id = path.file_stem()?.to_string_lossy().to_string();
    Some(SessionRecord {
        path: path.to_string_lossy().to_string(),
        session_id,
        started_at,
        entries: lines.len() as u64,
    })
}

fn mtime_rfc3339(path: &Path) -> Option<String> {
    let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
    OffsetDateTime::from(mtime).format(&Rfc3339).ok()
}
