//! Commit-range extraction via the `git` subprocess.
//!
//! Both modes return records oldest-first with full metadata and report
//! how many commits the content policy filtered out, so downstream
//! bookkeeping never loses track of dropped records.

use crate::error::RangeExtractionError;
use chronik_core::{CommitRecord, DiffStats, FileChange};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Command;

/// Max SHAs per `git show` invocation, to respect command-length limits.
const SHA_CHUNK: usize = 50;

/// Field and record separators for the metadata format string.
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// Result of an extraction: ordered records plus the number of commits
/// dropped by the content policy.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub commits: Vec<CommitRecord>,
    pub filtered_out: usize,
}

// ── Modes ──

/// Extract all commits on the path `[start, end]`, both ends inclusive,
/// oldest first.
///
/// When `start` is the repository's root commit the `start^..end` range
/// syntax is unusable (there is no parent to exclude from), so we
/// overfetch the full history up to `end`, independently compute the
/// member set of `[start, end]` with a parent-based walk, and filter the
/// raw list down to that set, re-including `start` itself.
pub fn extract_range(
    repo: &Path,
    start: &str,
    end: &str,
) -> Result<Extraction, RangeExtractionError> {
    let range = format!("{start}..{end}");
    let start = resolve_commit(repo, start)?;
    let end = resolve_commit(repo, end)?;

    let shas = if has_parent(repo, &start) {
        let spec = format!("{start}^..{end}");
        rev_list(repo, &[spec.as_str()], &range)?
    } else {
        let raw = rev_list(repo, &[end.as_str()], &range)?;
        let members = range_members(repo, &start, &end, &range)?;
        raw.into_iter().filter(|s| members.contains(s)).collect()
    };
    load_commits(repo, &shas, &range)
}

/// Extract all commits up to `end`, optionally bounded below by a
/// timestamp (`--since`), oldest first.
pub fn extract_since(
    repo: &Path,
    since: Option<&str>,
    end: &str,
) -> Result<Extraction, RangeExtractionError> {
    let range = match since {
        Some(ts) => format!("{ts}..{end}"),
        None => format!("..{end}"),
    };
    let end = resolve_commit(repo, end)?;
    let shas = match since {
        Some(ts) => {
            let bound = format!("--since={ts}");
            rev_list(repo, &[bound.as_str(), end.as_str()], &range)?
        }
        None => rev_list(repo, &[end.as_str()], &range)?,
    };
    load_commits(repo, &shas, &range)
}

/// Fetch metadata for exactly the given SHAs, preserving the caller's
/// order. SHAs are processed in fixed-size chunks and concatenated,
/// never reordered across chunk boundaries.
pub fn extract_shas(repo: &Path, shas: &[String]) -> Result<Extraction, RangeExtractionError> {
    let range = format!("{} explicit SHAs", shas.len());
    load_commits(repo, shas, &range)
}

// ── Member-set computation for the root-commit edge case ──

/// Exact set of SHAs in `[start, end]`, computed by walking parent links
/// backwards from `end`. The walk does not expand past `start`, and
/// `start` is inserted explicitly.
fn range_members(
    repo: &Path,
    start: &str,
    end: &str,
    range: &str,
) -> Result<HashSet<String>, RangeExtractionError> {
    let out = git_stdout(repo, &["rev-list", "--parents", end], range)?;
    let mut parents: HashMap<String, Vec<String>> = HashMap::new();
    for line in out.lines() {
        let mut fields = line.split_whitespace().map(String::from);
        if let Some(sha) = fields.next() {
            parents.insert(sha, fields.collect());
        }
    }

    let mut members = HashSet::new();
    let mut stack = vec![end.to_string()];
    while let Some(sha) = stack.pop() {
        if !members.insert(sha.clone()) || sha == start {
            continue;
        }
        if let Some(ps) = parents.get(&sha) {
            stack.extend(ps.iter().cloned());
        }
    }
    members.insert(start.to_string());
    Ok(members)
}

// ── Metadata loading ──

/// Load full commit records for `shas`, in chunks of `SHA_CHUNK`,
/// returning them in the caller's order with the content policy applied.
fn load_commits(
    repo: &Path,
    shas: &[String],
    range: &str,
) -> Result<Extraction, RangeExtractionError> {
    let mut by_sha: HashMap<String, CommitRecord> = HashMap::new();

    for chunk in shas.chunks(SHA_CHUNK) {
        let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();

        let mut args = vec![
            "show",
            "--numstat",
            "--date=iso-strict",
            "--format=%x1e%H%x1f%an%x1f%ad%x1f%s",
        ];
        args.extend(&refs);
        let meta = git_stdout(repo, &args, range)?;

        let mut args = vec!["show", "--name-status", "--format=%x1e%H"];
        args.extend(&refs);
        let statuses = parse_name_status(&git_stdout(repo, &args, range)?);

        for record in parse_numstat_records(&meta, &statuses) {
            by_sha.insert(record.hash.clone(), record);
        }
    }

    let mut commits = Vec::with_capacity(shas.len());
    let mut filtered_out = 0;
    for sha in shas {
        let Some(record) = by_sha.remove(sha) else {
            return Err(RangeExtractionError::Query {
                range: range.to_string(),
                message: format!("commit {sha} missing from metadata output"),
            });
        };
        if record.is_documentation_only() {
            filtered_out += 1;
        } else {
            commits.push(record);
        }
    }
    if filtered_out > 0 {
        tracing::debug!(filtered_out, range, "content policy dropped commits");
    }
    Ok(Extraction {
        commits,
        filtered_out,
    })
}

/// Parse `--numstat` output into records. Each record starts with a
/// `\x1e`-prefixed header line (`hash\x1fauthor\x1fdate\x1fsubject`)
/// followed by `additions\tdeletions\tpath` lines.
fn parse_numstat_records(
    out: &str,
    statuses: &HashMap<String, HashMap<String, String>>,
) -> Vec<CommitRecord> {
    let mut records = Vec::new();
    for block in out.split(RECORD_SEP) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let mut lines = block.lines();
        let Some(header) = lines.next() else { continue };
        let fields: Vec<&str> = header.split(FIELD_SEP).collect();
        if fields.len() < 4 {
            continue;
        }
        let hash = fields[0].trim().to_string();
        let commit_statuses = statuses.get(&hash);

        let mut files = Vec::new();
        let mut stats = DiffStats::default();
        for line in lines {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 3 {
                continue;
            }
            // Binary files report "-" for both counts
            let additions = cols[0].parse::<u64>().unwrap_or(0);
            let deletions = cols[1].parse::<u64>().unwrap_or(0);
            let path = cols[2].to_string();
            let status = commit_statuses
                .and_then(|m| m.get(&path))
                .cloned()
                .unwrap_or_else(|| "M".to_string());
            stats.files_changed += 1;
            stats.additions += additions;
            stats.deletions += deletions;
            files.push(FileChange {
                path,
                status,
                additions,
                deletions,
            });
        }

        records.push(CommitRecord {
            hash,
            author: fields[1].to_string(),
            date: fields[2].to_string(),
            message: fields[3].to_string(),
            files,
            stats,
        });
    }
    records
}

/// Parse `--name-status` output into `hash → path → status letter`.
/// Renames/copies (`R100\told\tnew`) are keyed by the new path.
fn parse_name_status(out: &str) -> HashMap<String, HashMap<String, String>> {
    let mut map = HashMap::new();
    for block in out.split(RECORD_SEP) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let mut lines = block.lines();
        let Some(hash) = lines.next() else { continue };
        let entry: &mut HashMap<String, String> =
            map.entry(hash.trim().to_string()).or_default();
        for line in lines {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 2 {
                continue;
            }
            let status = cols[0].to_string();
            let path = cols.last().unwrap_or(&"").to_string();
            entry.insert(path, status);
        }
    }
    map
}

// ── Plumbing ──

/// Resolve a ref to a full commit SHA; errors carry the offending input.
fn resolve_commit(repo: &Path, sha: &str) -> Result<String, RangeExtractionError> {
    let spec = format!("{sha}^{{commit}}");
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &spec])
        .current_dir(repo)
        .output()
        .map_err(|e| RangeExtractionError::Query {
            range: sha.to_string(),
            message: format!("git not available: {e}"),
        })?;
    if !output.status.success() {
        return Err(RangeExtractionError::InvalidSha {
            sha: sha.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// True if the commit has at least one parent (i.e. is not a root commit).
fn has_parent(repo: &Path, sha: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("{sha}^")])
        .current_dir(repo)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// `git rev-list --reverse <args>` → SHAs oldest first.
fn rev_list(repo: &Path, args: &[&str], range: &str) -> Result<Vec<String>, RangeExtractionError> {
    let mut full = vec!["rev-list", "--reverse"];
    full.extend(args);
    let out = git_stdout(repo, &full, range)?;
    Ok(out.lines().map(|l| l.trim().to_string()).collect())
}

fn git_stdout(repo: &Path, args: &[&str], range: &str) -> Result<String, RangeExtractionError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| RangeExtractionError::Query {
            range: range.to_string(),
            message: format!("git not available: {e}"),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RangeExtractionError::Query {
            range: range.to_string(),
            message: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
