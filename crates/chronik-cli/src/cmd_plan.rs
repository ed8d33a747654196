use anyhow::Result;
use chronik_checkpoint::CheckpointRegistry;
use chronik_history::{extract_range, extract_since, plan_batches};
use std::path::{Path, PathBuf};

/// Execute `chronik plan`: show the batch partition a run would process,
/// without invoking the pipeline or writing checkpoints.
pub fn execute(
    repo: &Path,
    since: Option<&str>,
    start: Option<&str>,
    end: &str,
    batch_size: usize,
    team: &str,
    store_root: Option<PathBuf>,
) -> Result<()> {
    let registry = match store_root {
        Some(root) => CheckpointRegistry::with_root(root),
        None => CheckpointRegistry::new(),
    };
    let batch_store = registry.batch_store(repo, team);
    let workflow_store = registry.workflow_store(repo, team);

    let (extraction, first_number) = if let Some(start) = start {
        (extract_range(repo, start, end)?, 1)
    } else {
        let resume_after = batch_store.lock().unwrap().last_completed();
        match resume_after {
            Some(prev) => {
                let mut ext = extract_range(repo, &prev.commit_range.end, end)?;
                if ext
                    .commits
                    .first()
                    .is_some_and(|c| c.hash == prev.commit_range.end)
                {
                    ext.commits.remove(0);
                }
                (ext, prev.batch_number + 1)
            }
            None => {
                let since = since
                    .map(String::from)
                    .or_else(|| workflow_store.effective_start());
                (extract_since(repo, since.as_deref(), end)?, 1)
            }
        }
    };

    let filtered = extraction.filtered_out;
    let total_commits: usize = extraction.commits.len();
    let batches = plan_batches(extraction.commits, batch_size, first_number);

    if batches.is_empty() {
        println!("History is up to date — nothing to process.");
        if filtered > 0 {
            println!("({filtered} documentation-only commits filtered)");
        }
        return Ok(());
    }

    println!(
        "{} batches over {} commits ({} filtered):\n",
        batches.len(),
        total_commits,
        filtered,
    );
    for batch in &batches {
        println!(
            "  #{:<4} {} commits  {}..{}  [{} → {}]",
            batch.number,
            batch.commits.len(),
            short(&batch.commit_range.start),
            short(&batch.commit_range.end),
            batch.date_range.start,
            batch.date_range.end,
        );
    }
    Ok(())
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}
