//! Supervised execution of one workflow run.
//!
//! States: starting → running → (completed | failed). Every fatal
//! condition (a pipeline error, the watchdog, or signal-driven
//! cancellation) funnels into one idempotent cleanup path that writes
//! a terminal progress record, shuts the pipeline down, and removes the
//! pid and run-config files, so an external reader never observes a run
//! that is silently stuck forever.
//!
//! The heartbeat proves only that the cooperative scheduler is getting
//! turns: a stage that blocks the runtime without awaiting also stops
//! heartbeats. The watchdog, a single timer armed for the whole run,
//! is the only guard against that.

use crate::config::{RunConfig, SupervisorOptions};
use crate::driver::{drive, RunOutcome};
use crate::pipeline::Pipeline;
use crate::progress::{ProgressStatus, ProgressWriter};
use crate::workflow::resolve_workflow;
use chronik_checkpoint::CheckpointRegistry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a run was force-terminated. Signal- and watchdog-driven exits
/// share code 130 so launchers can tell "externally stopped" apart from
/// a genuine pipeline failure (code 1).
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("terminated by signal")]
    Signal,

    #[error("watchdog expired after {0:?}: run exceeded the maximum duration")]
    Watchdog(Duration),

    #[error("{0:#}")]
    Pipeline(anyhow::Error),

    #[error("supervisor error: {0:#}")]
    Internal(anyhow::Error),
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::Signal | FatalError::Watchdog(_) => 130,
            FatalError::Pipeline(_) | FatalError::Internal(_) => 1,
        }
    }
}

/// Run one workflow to its terminal state.
///
/// `config_path`, when given, is the consumed run-config file; it is
/// deleted together with the pid file on any termination. Signals are
/// expected to arrive as cancellation of `cancel`: the caller installs
/// the OS handlers and maps the returned error to an exit code.
pub async fn run_supervised(
    config: RunConfig,
    config_path: Option<PathBuf>,
    opts: SupervisorOptions,
    registry: &CheckpointRegistry,
    pipeline: &dyn Pipeline,
    cancel: CancellationToken,
) -> Result<RunOutcome, FatalError> {
    let progress = ProgressWriter::new(config.progress_file.clone(), config.workflow_id.clone());
    let cleaned = AtomicBool::new(false);

    let result = supervise(&config, &opts, registry, pipeline, cancel, &progress).await;
    finalize(
        &result,
        &config,
        config_path.as_deref(),
        pipeline,
        &progress,
        &cleaned,
    )
    .await;
    result
}

async fn supervise(
    config: &RunConfig,
    opts: &SupervisorOptions,
    registry: &CheckpointRegistry,
    pipeline: &dyn Pipeline,
    cancel: CancellationToken,
    progress: &ProgressWriter,
) -> Result<RunOutcome, FatalError> {
    // ── starting ──
    chronik_store::write_atomic(&config.pid_file, std::process::id().to_string().as_bytes())
        .map_err(FatalError::Internal)?;
    progress.write(|r| r.status = ProgressStatus::Starting);

    let resolved = resolve_workflow(&config.workflow_name, &config.parameters);
    tracing::info!(
        workflow = %resolved.name,
        repository = %config.repository_path.display(),
        "workflow run starting"
    );

    // ── running ──
    progress.write(|r| {
        r.status = ProgressStatus::Running;
        r.current_step = Some("resolve workflow".into());
    });

    let heartbeat = {
        let progress = progress.clone();
        let period = opts.heartbeat;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                // Merge-write: refreshes elapsed/lastUpdate, preserves
                // externally-owned fields and the current status.
                progress.write(|_| {});
            }
        })
    };

    let result = tokio::select! {
        outcome = drive(config, opts, &resolved, registry, progress, pipeline) => {
            outcome.map_err(FatalError::Pipeline)
        }
        _ = tokio::time::sleep(opts.watchdog) => Err(FatalError::Watchdog(opts.watchdog)),
        _ = cancel.cancelled() => Err(FatalError::Signal),
    };

    heartbeat.abort();
    result
}

/// Shared terminal path. Guarded so concurrent triggers clean up
/// exactly once.
async fn finalize(
    result: &Result<RunOutcome, FatalError>,
    config: &RunConfig,
    config_path: Option<&Path>,
    pipeline: &dyn Pipeline,
    progress: &ProgressWriter,
    cleaned: &AtomicBool,
) {
    if cleaned.swap(true, Ordering::SeqCst) {
        return;
    }

    match result {
        Ok(outcome) => {
            progress.write(|r| {
                r.status = ProgressStatus::Completed;
                r.current_step = None;
                r.steps_completed = Some(outcome.batches_processed);
                r.total_steps = outcome.total_steps.or(Some(outcome.batches_processed));
                r.message = Some(format!(
                    "processed {} batches ({} commits, {} sessions, {} filtered)",
                    outcome.batches_processed,
                    outcome.commits_processed,
                    outcome.sessions_processed,
                    outcome.filtered_commits,
                ));
                r.error = None;
            });
            tracing::info!(
                workflow = %outcome.workflow,
                batches = outcome.batches_processed,
                commits = outcome.commits_processed,
                sessions = outcome.sessions_processed,
                entities_created = outcome.stats.entities_created,
                relations_added = outcome.stats.relations_added,
                "workflow run completed"
            );
        }
        Err(fatal) => {
            let reason = fatal.to_string();
            let elapsed = progress.elapsed_seconds();
            progress.write(|r| {
                r.status = ProgressStatus::Failed;
                r.error = Some(reason.clone());
                r.message = Some(format!("run failed after {elapsed}s"));
            });
            tracing::warn!(error = %reason, "workflow run failed");
            pipeline.shutdown().await;
        }
    }

    remove_file_logged(&config.pid_file);
    if let Some(path) = config_path {
        remove_file_logged(path);
    }
}

fn remove_file_logged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "cleanup could not remove file");
        }
    }
}
