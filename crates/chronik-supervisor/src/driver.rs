//! The batch loop: extract history, partition it chronologically, and
//! feed one batch at a time to the external pipeline, checkpointing
//! each result before moving on.
//!
//! Batches are strictly sequential and oldest-first: downstream
//! deduplication assumes monotonically increasing history, so this
//! ordering is a correctness requirement, not a performance choice.
//! A batch is either fully checkpointed or treated as never-happened:
//! whatever is in flight when the run dies is redone from its start
//! SHA on the next run.

use crate::config::{RunConfig, SupervisorOptions};
use crate::pipeline::{batch_stats_from_report, Pipeline};
use crate::progress::{BatchProgress, ProgressStatus, ProgressWriter};
use crate::workflow::ResolvedWorkflow;
use anyhow::{bail, Context, Result};
use chronik_checkpoint::{BatchCheckpoint, CheckpointKind, CheckpointRegistry};
use chronik_core::timeutil::now_rfc3339;
use chronik_core::{BatchStats, DateRange};
use chronik_history::{
    extract_range, extract_sessions, extract_shas, extract_since, plan_batches,
    sessions_in_range, Extraction,
};
use serde_json::json;
use uuid::Uuid;

/// Fixed namespace for deterministic batch ids: re-recording batch N of
/// a given repo+team always hits the same ledger entry.
const BATCH_NS: Uuid = Uuid::from_bytes([
    0xc4, 0x01, 0x1c, 0x00, 0x00, 0x00, 0x40, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
]);

fn batch_id(project_id: &str, team: &str, number: u64) -> String {
    Uuid::new_v5(&BATCH_NS, format!("{project_id}:{team}:{number}").as_bytes()).to_string()
}

/// Summary of one completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub workflow: String,
    pub batches_processed: u64,
    pub commits_processed: u64,
    pub sessions_processed: u64,
    pub filtered_commits: u64,
    /// True step count reported by the last pipeline invocation.
    pub total_steps: Option<u64>,
    pub stats: BatchStats,
}

pub async fn drive(
    config: &RunConfig,
    opts: &SupervisorOptions,
    resolved: &ResolvedWorkflow,
    registry: &CheckpointRegistry,
    progress: &ProgressWriter,
    pipeline: &dyn Pipeline,
) -> Result<RunOutcome> {
    let repo = config.repository_path.as_path();
    let team = opts.team.as_str();
    let params = &resolved.parameters;
    let project = chronik_store::project_id(repo);

    let workflow_store = registry.workflow_store(repo, team);
    workflow_store
        .migrate_from_legacy()
        .context("migrating legacy workflow checkpoints")?;
    let batch_store = registry.batch_store(repo, team);

    // ── Extraction ──

    progress.write(|r| {
        r.status = ProgressStatus::Running;
        r.current_step = Some("extract history".into());
    });

    let end = params
        .get("endCommit")
        .and_then(|v| v.as_str())
        .unwrap_or("HEAD");
    let since = params
        .get("since")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| workflow_store.effective_start());
    let resume_after = batch_store.lock().unwrap().last_completed();

    let extraction = extract_commits(config, params, end, since.as_deref(), &resume_after)?;
    workflow_store
        .set(CheckpointKind::GitAnalysis, &now_rfc3339())
        .context("recording extraction checkpoint")?;

    let sessions = if params
        .get("includeSessions")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        let window = DateRange {
            start: since.clone().unwrap_or_else(|| "1970-01-01T00:00:00Z".into()),
            end: now_rfc3339(),
        };
        let found = extract_sessions(&registry.project_paths(repo).sessions_dir(), &window)?;
        workflow_store
            .set(CheckpointKind::SessionAnalysis, &now_rfc3339())
            .context("recording session checkpoint")?;
        found
    } else {
        Vec::new()
    };

    // ── Partition ──

    let first_number = batch_store
        .lock()
        .unwrap()
        .last_completed_batch()
        .map(|n| n + 1)
        .unwrap_or(1);
    let batches = plan_batches(extraction.commits, opts.batch_size, first_number);
    let total_batches = batches.len() as u64;
    tracing::info!(
        workflow = %resolved.name,
        batches = total_batches,
        filtered = extraction.filtered_out,
        "planned chronological batches"
    );

    // ── Sequential batch processing ──

    let mut outcome = RunOutcome {
        workflow: resolved.name.clone(),
        batches_processed: 0,
        commits_processed: 0,
        sessions_processed: 0,
        filtered_commits: extraction.filtered_out as u64,
        total_steps: None,
        stats: BatchStats::default(),
    };

    for (index, batch) in batches.into_iter().enumerate() {
        progress.write(|r| {
            r.status = ProgressStatus::Running;
            r.current_step = Some(format!("batch {}", batch.number));
            r.steps_completed = Some(index as u64);
            r.batch_progress = Some(BatchProgress {
                current_batch: index as u64 + 1,
                total_batches,
            });
        });

        let batch_sessions = sessions_in_range(&sessions, &batch.date_range);

        let mut batch_params = resolved.parameters.clone();
        if let Some(obj) = batch_params.as_object_mut() {
            obj.insert("batchNumber".into(), json!(batch.number));
            obj.insert(
                "commits".into(),
                json!(batch.commits.iter().map(|c| &c.hash).collect::<Vec<_>>()),
            );
            obj.insert("commitRange".into(), serde_json::to_value(&batch.commit_range)?);
            obj.insert("dateRange".into(), serde_json::to_value(&batch.date_range)?);
            obj.insert(
                "sessions".into(),
                json!(batch_sessions.iter().map(|s| &s.path).collect::<Vec<_>>()),
            );
        }

        let report = pipeline
            .execute(&resolved.name, &batch_params)
            .await
            .with_context(|| format!("pipeline failed on batch {}", batch.number))?;
        if report.failed() {
            bail!(
                "pipeline reported failure on batch {}: {}",
                batch.number,
                report.errors.join("; ")
            );
        }

        let mut stats = batch_stats_from_report(&report);
        stats.commits = batch.commits.len() as u64;
        stats.sessions = batch_sessions.len() as u64;

        batch_store.lock().unwrap().save_batch(BatchCheckpoint {
            batch_id: batch_id(&project, team, batch.number),
            batch_number: batch.number,
            completed_at: now_rfc3339(),
            commit_range: batch.commit_range.clone(),
            date_range: batch.date_range.clone(),
            stats: stats.clone(),
            step_outputs: opts.record_step_outputs.then(|| report.results.clone()),
        });

        outcome.batches_processed += 1;
        outcome.commits_processed += stats.commits;
        outcome.sessions_processed += stats.sessions;
        outcome.total_steps = report.total_steps.or(outcome.total_steps);
        outcome.stats.add(&stats);
    }

    // Full completion: the corroborated signal that extraction AND
    // downstream persistence both succeeded.
    workflow_store
        .set(CheckpointKind::RunCompletion, &now_rfc3339())
        .context("recording run completion checkpoint")?;

    Ok(outcome)
}

/// Pick the extraction mode from the resolved parameters, falling back
/// to resuming after the last checkpointed commit.
fn extract_commits(
    config: &RunConfig,
    params: &serde_json::Value,
    end: &str,
    since: Option<&str>,
    resume_after: &Option<BatchCheckpoint>,
) -> Result<Extraction> {
    let repo = config.repository_path.as_path();

    if let Some(shas) = params.get("commits").and_then(|v| v.as_array()) {
        let shas: Vec<String> = shas
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        return Ok(extract_shas(repo, &shas)?);
    }
    if let Some(start) = params.get("startCommit").and_then(|v| v.as_str()) {
        return Ok(extract_range(repo, start, end)?);
    }
    if let Some(prev) = resume_after {
        // The range is inclusive on both ends; the previous batch's end
        // commit is already checkpointed, so drop it from the front.
        let mut extraction = extract_range(repo, &prev.commit_range.end, end)?;
        if extraction
            .commits
            .first()
            .is_some_and(|c| c.hash == prev.commit_range.end)
        {
            extraction.commits.remove(0);
        }
        return Ok(extraction);
    }
    Ok(extract_since(repo, since, end)?)
}
