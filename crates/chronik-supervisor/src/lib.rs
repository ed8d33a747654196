pub mod config;
pub mod driver;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod workflow;

pub use config::{RunConfig, SupervisorOptions};
pub use driver::RunOutcome;
pub use pipeline::{CommandPipeline, MockPipeline, Pipeline, PipelineReport};
pub use progress::{BatchProgress, ProgressRecord, ProgressStatus, ProgressWriter};
pub use runner::{run_supervised, FatalError};
pub use workflow::{resolve_workflow, ResolvedWorkflow};
