mod cmd_checkpoint;
mod cmd_plan;
mod cmd_run;
mod cmd_status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chronik", version, about = "Incremental knowledge pipeline over git and session history")]
struct Cli {
    /// Store root override (default: per-user data dir)
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one supervised workflow run
    Run {
        /// Run-config file written by the launcher (JSON)
        #[arg(long, conflicts_with_all = ["workflow", "repo"])]
        config: Option<PathBuf>,
        /// Workflow name or alias (alternative to --config)
        #[arg(long, requires = "repo")]
        workflow: Option<String>,
        /// Repository to analyze (alternative to --config)
        #[arg(long)]
        repo: Option<PathBuf>,
        /// Team scope for checkpoints and progress
        #[arg(long, default_value = "default")]
        team: String,
        /// Maximum run duration in seconds before the watchdog fires
        #[arg(long)]
        watchdog_secs: Option<u64>,
        /// Heartbeat interval in seconds
        #[arg(long)]
        heartbeat_secs: Option<u64>,
        /// External pipeline command (reads params on stdin, prints a report)
        #[arg(long, default_value = "chronik-pipeline")]
        pipeline_cmd: PathBuf,
    },
    /// Preview the chronological batch partition without processing
    Plan {
        #[arg(long)]
        repo: PathBuf,
        /// Analyze since this RFC-3339 timestamp
        #[arg(long, conflicts_with = "start")]
        since: Option<String>,
        /// Start of an explicit commit range (inclusive)
        #[arg(long)]
        start: Option<String>,
        /// End of the range (inclusive)
        #[arg(long, default_value = "HEAD")]
        end: String,
        #[arg(long, default_value_t = 20)]
        batch_size: usize,
        #[arg(long, default_value = "default")]
        team: String,
    },
    /// Show the latest progress record and checkpoint summary
    Status {
        #[arg(long)]
        repo: PathBuf,
        #[arg(long, default_value = "default")]
        team: String,
        /// Progress file to read (default: the team's conventional path)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Inspect or rewind the batch checkpoint ledger
    Checkpoint {
        #[command(subcommand)]
        cmd: CheckpointCmd,
    },
}

#[derive(Subcommand)]
enum CheckpointCmd {
    /// List completed batches and accumulated totals
    List {
        #[arg(long)]
        repo: PathBuf,
        #[arg(long, default_value = "default")]
        team: String,
    },
    /// Remove every batch with number >= N to force reprocessing
    Reset {
        #[arg(long)]
        repo: PathBuf,
        #[arg(long, default_value = "default")]
        team: String,
        #[arg(long)]
        from: u64,
    },
    /// Clear the whole ledger
    Clear {
        #[arg(long)]
        repo: PathBuf,
        #[arg(long, default_value = "default")]
        team: String,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store_root = cli.store_root.clone();

    match cli.cmd {
        Command::Run {
            config,
            workflow,
            repo,
            team,
            watchdog_secs,
            heartbeat_secs,
            pipeline_cmd,
        } => {
            let code = cmd_run::execute(&cmd_run::RunParams {
                config,
                workflow,
                repo,
                team,
                watchdog_secs,
                heartbeat_secs,
                pipeline_cmd,
                store_root,
            })?;
            std::process::exit(code);
        }
        Command::Plan {
            repo,
            since,
            start,
            end,
            batch_size,
            team,
        } => cmd_plan::execute(
            &repo,
            since.as_deref(),
            start.as_deref(),
            &end,
            batch_size,
            &team,
            store_root,
        ),
        Command::Status { repo, team, file } => {
            cmd_status::execute(&repo, &team, file.as_deref(), store_root)
        }
        Command::Checkpoint { cmd } => match cmd {
            CheckpointCmd::List { repo, team } => {
                cmd_checkpoint::list(&repo, &team, store_root)
            }
            CheckpointCmd::Reset { repo, team, from } => {
                cmd_checkpoint::reset(&repo, &team, from, store_root)
            }
            CheckpointCmd::Clear { repo, team } => {
                cmd_checkpoint::clear(&repo, &team, store_root)
            }
        },
    }
}
