use anyhow::Result;
use chronik_checkpoint::CheckpointRegistry;
use std::path::{Path, PathBuf};

fn registry(store_root: Option<PathBuf>) -> CheckpointRegistry {
    match store_root {
        Some(root) => CheckpointRegistry::with_root(root),
        None => CheckpointRegistry::new(),
    }
}

/// `chronik checkpoint list`
pub fn list(repo: &Path, team: &str, store_root: Option<PathBuf>) -> Result<()> {
    let registry = registry(store_root);
    let store = registry.batch_store(repo, team);
    let mut store = store.lock().unwrap();
    let data = store.load().clone();

    if data.completed_batches.is_empty() {
        println!("No completed batches for team \"{team}\".");
        return Ok(());
    }

    println!(
        "{} completed batches (last: #{}):\n",
        data.completed_batches.len(),
        data.last_completed_batch.unwrap_or(0),
    );
    for batch in &data.completed_batches {
        println!(
            "  #{:<4} {}  {} commits, {} sessions, {} entities  (completed {})",
            batch.batch_number,
            &batch.batch_id[..8],
            batch.stats.commits,
            batch.stats.sessions,
            batch.stats.entities_created + batch.stats.entities_updated,
            batch.completed_at,
        );
    }
    let total = &data.accumulated_stats;
    println!(
        "\nAccumulated: {} commits, {} sessions, {} tokens, {} entities created",
        total.commits, total.sessions, total.tokens_used, total.entities_created,
    );
    Ok(())
}

/// `chronik checkpoint reset --from N`
pub fn reset(repo: &Path, team: &str, from: u64, store_root: Option<PathBuf>) -> Result<()> {
    let registry = registry(store_root);
    let store = registry.batch_store(repo, team);
    let mut store = store.lock().unwrap();
    store.reset_from_batch(from);
    match store.last_completed_batch() {
        Some(n) => println!("Reset complete — ledger now ends at batch #{n}."),
        None => println!("Reset complete — ledger is empty."),
    }
    Ok(())
}

/// `chronik checkpoint clear`
pub fn clear(repo: &Path, team: &str, store_root: Option<PathBuf>) -> Result<()> {
    let registry = registry(store_root);
    let store = registry.batch_store(repo, team);
    store.lock().unwrap().clear_all();
    println!("Cleared all batch checkpoints for team \"{team}\".");
    Ok(())
}
