use anyhow::{bail, Context, Result};
use chronik_checkpoint::CheckpointRegistry;
use chronik_supervisor::{run_supervised, CommandPipeline, RunConfig, SupervisorOptions};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RunParams {
    pub config: Option<PathBuf>,
    pub workflow: Option<String>,
    pub repo: Option<PathBuf>,
    pub team: String,
    pub watchdog_secs: Option<u64>,
    pub heartbeat_secs: Option<u64>,
    pub pipeline_cmd: PathBuf,
    pub store_root: Option<PathBuf>,
}

/// Execute `chronik run`. Returns the process exit code: 0 success,
/// 1 failure, 130 signal/watchdog termination.
pub fn execute(params: &RunParams) -> Result<i32> {
    let registry = match &params.store_root {
        Some(root) => CheckpointRegistry::with_root(root.clone()),
        None => CheckpointRegistry::new(),
    };

    let (config, config_path) = match &params.config {
        Some(path) => (RunConfig::load(path)?, Some(path.clone())),
        None => {
            let Some(workflow) = &params.workflow else {
                bail!("either --config or --workflow with --repo is required");
            };
            let Some(repo) = &params.repo else {
                bail!("--repo is required with --workflow");
            };
            (
                default_run_config(&registry, workflow, repo, &params.team)?,
                None,
            )
        }
    };

    let mut opts = SupervisorOptions {
        team: params.team.clone(),
        ..Default::default()
    }
    .apply_parameters(&config.parameters);
    if let Some(secs) = params.watchdog_secs {
        opts.watchdog = Duration::from_secs(secs);
    }
    if let Some(secs) = params.heartbeat_secs {
        opts.heartbeat = Duration::from_secs(secs);
    }

    let paths = registry.project_paths(&config.repository_path);
    paths.ensure_dirs()?;

    // Advisory single-writer lock: concurrent supervisors against the
    // same (repository, team) race on every shared file, so warn loudly.
    let _lock = match chronik_store::lock_file(&paths.run_lock(&opts.team)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(error = %e,
                "could not take the run lock — another supervisor may be active");
            None
        }
    };

    let pipeline = CommandPipeline::new(params.pipeline_cmd.clone());
    pipeline.verify_available()?;

    // Ctrl+C / SIGTERM translate into cancellation of the supervised run
    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run_supervised(
        config,
        config_path,
        opts,
        &registry,
        &pipeline,
        cancel,
    ));

    match result {
        Ok(outcome) => {
            println!(
                "✓ Workflow \"{}\" completed: {} batches, {} commits, {} sessions ({} filtered)",
                outcome.workflow,
                outcome.batches_processed,
                outcome.commits_processed,
                outcome.sessions_processed,
                outcome.filtered_commits,
            );
            Ok(0)
        }
        Err(fatal) => {
            eprintln!("✗ Workflow failed: {fatal}");
            Ok(fatal.exit_code())
        }
    }
}

/// Build a run config from flags when no launcher-written file exists.
fn default_run_config(
    registry: &CheckpointRegistry,
    workflow: &str,
    repo: &std::path::Path,
    team: &str,
) -> Result<RunConfig> {
    let paths = registry.project_paths(repo);
    paths
        .ensure_dirs()
        .context("creating project store layout")?;
    Ok(RunConfig {
        workflow_id: ulid::Ulid::new().to_string(),
        workflow_name: workflow.to_string(),
        repository_path: repo.to_path_buf(),
        parameters: serde_json::json!({ "team": team }),
        progress_file: paths.progress_file(team),
        pid_file: paths.base().join("runs").join(format!("{team}.pid")),
    })
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_scoped_to_repo_and_team() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CheckpointRegistry::with_root(dir.path().to_path_buf());
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();

        let config = default_run_config(&registry, "analyze", &repo, "platform").unwrap();
        assert_eq!(config.workflow_name, "analyze");
        assert!(config.progress_file.ends_with("runs/platform-progress.json"));
        assert!(config.pid_file.ends_with("runs/platform.pid"));
        assert_eq!(config.parameters["team"], "platform");
        // Generated ids are unique per invocation
        let again = default_run_config(&registry, "analyze", &repo, "platform").unwrap();
        assert_ne!(config.workflow_id, again.workflow_id);
    }
}
