//! The seam to the external processing pipeline.
//!
//! One invocation per batch: the supervisor hands over a workflow name
//! and parameters, gets back an opaque report, and checkpoints what it
//! says. The pipeline's internals (semantic analysis, ontology
//! classification, graph persistence) are not inspected beyond the
//! report fields.

use anyhow::Result;
use async_trait::async_trait;
use chronik_core::{BatchStats, OperatorStats};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;

/// What one pipeline invocation returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u64>,
    #[serde(default)]
    pub results: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PipelineReport {
    pub fn failed(&self) -> bool {
        self.status == "failed"
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Run one opaque unit of work.
    async fn execute(&self, workflow: &str, parameters: &serde_json::Value)
        -> Result<PipelineReport>;

    /// Best-effort shutdown of the external coordinator during cleanup.
    async fn shutdown(&self) {}
}

/// Derive checkpointable stats from a report's `results` object.
/// Unknown or missing counters default to zero; per-operator sub-results
/// are carried over when present.
pub fn batch_stats_from_report(report: &PipelineReport) -> BatchStats {
    let results = &report.results;
    let count = |key: &str| results.get(key).and_then(|v| v.as_u64()).unwrap_or(0);

    let per_operator = results
        .get("perOperator")
        .cloned()
        .and_then(|v| serde_json::from_value::<std::collections::BTreeMap<String, OperatorStats>>(v).ok())
        .unwrap_or_default();

    BatchStats {
        commits: 0,
        sessions: 0,
        tokens_used: count("tokensUsed"),
        entities_created: count("entitiesCreated"),
        entities_updated: count("entitiesUpdated"),
        relations_added: count("relationsAdded"),
        per_operator,
    }
}

// ── Command-backed pipeline ──

/// Runs the external pipeline as a child process: parameters go in on
/// stdin as JSON, the report comes back on stdout.
pub struct CommandPipeline {
    pub command: PathBuf,
    pub args: Vec<String>,
}

impl CommandPipeline {
    pub fn new(command: PathBuf) -> Self {
        Self {
            command,
            args: Vec::new(),
        }
    }

    /// Check that the pipeline binary is reachable.
    pub fn verify_available(&self) -> Result<()> {
        let status = std::process::Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => anyhow::bail!(
                "pipeline command not found (looked for {:?})",
                self.command
            ),
        }
    }
}

#[async_trait]
impl Pipeline for CommandPipeline {
    async fn execute(
        &self,
        workflow: &str,
        parameters: &serde_json::Value,
    ) -> Result<PipelineReport> {
        use tokio::io::AsyncWriteExt;

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(workflow)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let payload = serde_json::to_vec(parameters)?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open pipeline stdin"))?;
        stdin.write_all(&payload).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "pipeline exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stdout).trim()
            );
        }
        let report: PipelineReport = serde_json::from_slice(&output.stdout)?;
        Ok(report)
    }
}

// ── Mock pipeline for tests ──

/// Scripted pipeline. Pops one report per call; an exhausted script
/// returns a default "completed" report. `hanging()` builds a pipeline
/// whose call never resolves (watchdog tests); `failing()` one that
/// always errors.
pub struct MockPipeline {
    reports: std::sync::Mutex<Vec<PipelineReport>>,
    calls: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
    mode: MockMode,
}

enum MockMode {
    Scripted,
    Hang,
    Fail(String),
}

impl Default for MockPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPipeline {
    pub fn new() -> Self {
        Self {
            reports: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::Mutex::new(Vec::new()),
            mode: MockMode::Scripted,
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: MockMode::Hang,
            ..Self::new()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            mode: MockMode::Fail(message.to_string()),
            ..Self::new()
        }
    }

    pub fn set_reports(&self, reports: Vec<PipelineReport>) {
        *self.reports.lock().unwrap() = reports;
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn done_report(results: serde_json::Value) -> PipelineReport {
        PipelineReport {
            status: "completed".into(),
            current_step: Some("persist".into()),
            total_steps: Some(4),
            results,
            errors: Vec::new(),
        }
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    async fn execute(
        &self,
        workflow: &str,
        parameters: &serde_json::Value,
    ) -> Result<PipelineReport> {
        self.calls
            .lock()
            .unwrap()
            .push((workflow.to_string(), parameters.clone()));

        match &self.mode {
            MockMode::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            MockMode::Fail(message) => anyhow::bail!("{message}"),
            MockMode::Scripted => {
                let mut reports = self.reports.lock().unwrap();
                if reports.is_empty() {
                    Ok(Self::done_report(serde_json::json!({})))
                } else {
                    Ok(reports.remove(0))
                }
            }
        }
    }
}
