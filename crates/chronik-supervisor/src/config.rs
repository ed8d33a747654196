//! Run configuration handed to the supervisor by an external launcher.
//!
//! The config file is consumed once at process start and deleted on
//! normal or abnormal termination, so a stale file never causes a
//! phantom re-run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub workflow_id: String,
    pub workflow_name: String,
    pub repository_path: PathBuf,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub progress_file: PathBuf,
    pub pid_file: PathBuf,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading run config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing run config: {}", path.display()))
    }
}

/// Tunables of a supervised run. Parameter overrides come from the run
/// config's `parameters` object; the CLI may override timers directly.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub heartbeat: Duration,
    pub watchdog: Duration,
    pub batch_size: usize,
    pub team: String,
    /// Keep verbatim pipeline step outputs in each batch checkpoint.
    pub record_step_outputs: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(5),
            watchdog: Duration::from_secs(4 * 60 * 60),
            batch_size: 20,
            team: "default".to_string(),
            record_step_outputs: false,
        }
    }
}

impl SupervisorOptions {
    /// Apply overrides from the run config's parameters object.
    pub fn apply_parameters(mut self, parameters: &serde_json::Value) -> Self {
        if let Some(n) = parameters.get("batchSize").and_then(|v| v.as_u64()) {
            self.batch_size = n as usize;
        }
        if let Some(team) = parameters.get("team").and_then(|v| v.as_str()) {
            self.team = team.to_string();
        }
        if let Some(b) = parameters.get("recordStepOutputs").and_then(|v| v.as_bool()) {
            self.record_step_outputs = b;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_parses_camel_case_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "workflowId": "01JLX",
                "workflowName": "analyze",
                "repositoryPath": "/tmp/repo",
                "parameters": {"batchSize": 10, "team": "platform"},
                "progressFile": "/tmp/progress.json",
                "pidFile": "/tmp/run.pid"
            }"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.workflow_id, "01JLX");
        assert_eq!(config.workflow_name, "analyze");
        assert_eq!(config.repository_path, PathBuf::from("/tmp/repo"));
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(RunConfig::load(Path::new("/nonexistent/run.json")).is_err());
    }

    #[test]
    fn parameters_override_defaults() {
        let params = serde_json::json!({
            "batchSize": 7,
            "team": "infra",
            "recordStepOutputs": true
        });
        let opts = SupervisorOptions::default().apply_parameters(&params);
        assert_eq!(opts.batch_size, 7);
        assert_eq!(opts.team, "infra");
        assert!(opts.record_step_outputs);
    }

    #[test]
    fn absent_parameters_keep_defaults() {
        let opts = SupervisorOptions::default().apply_parameters(&serde_json::json!({}));
        assert_eq!(opts.batch_size, 20);
        assert_eq!(opts.team, "default");
        assert!(!opts.record_step_outputs);
    }
}
