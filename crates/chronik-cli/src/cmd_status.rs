use anyhow::Result;
use chronik_checkpoint::CheckpointRegistry;
use chronik_supervisor::ProgressRecord;
use std::path::{Path, PathBuf};

/// Execute `chronik status`: print the latest progress record and a
/// checkpoint summary for `(repo, team)`.
pub fn execute(
    repo: &Path,
    team: &str,
    file: Option<&Path>,
    store_root: Option<PathBuf>,
) -> Result<()> {
    let registry = match store_root {
        Some(root) => CheckpointRegistry::with_root(root),
        None => CheckpointRegistry::new(),
    };
    let paths = registry.project_paths(repo);
    let progress_path = file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.progress_file(team));

    match read_progress(&progress_path) {
        Some(record) => {
            println!("Workflow:  {}", record.workflow_id);
            println!("Status:    {:?}", record.status);
            if let Some(step) = &record.current_step {
                println!("Step:      {step}");
            }
            if let Some(bp) = &record.batch_progress {
                println!("Batch:     {}/{}", bp.current_batch, bp.total_batches);
            }
            if let Some(message) = &record.message {
                println!("Message:   {message}");
            }
            if let Some(error) = &record.error {
                println!("Error:     {error}");
            }
            println!("Elapsed:   {}s", record.elapsed_seconds);
            println!("Updated:   {}", record.last_update);
        }
        None => println!("No progress record at {}", progress_path.display()),
    }

    let store = registry.batch_store(repo, team);
    let mut store = store.lock().unwrap();
    let stats = store.accumulated_stats();
    match store.last_completed_batch() {
        Some(n) => {
            println!("\nCheckpoints: last batch #{n}");
            println!(
                "Totals: {} commits, {} sessions, {} entities created, {} updated, {} relations",
                stats.commits,
                stats.sessions,
                stats.entities_created,
                stats.entities_updated,
                stats.relations_added,
            );
        }
        None => println!("\nCheckpoints: none"),
    }
    Ok(())
}

fn read_progress(path: &Path) -> Option<ProgressRecord> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
