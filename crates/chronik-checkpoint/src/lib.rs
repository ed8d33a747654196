pub mod batch;
pub mod registry;
pub mod workflow;

pub use batch::{BatchCheckpoint, BatchCheckpointData, BatchCheckpointStore};
pub use registry::CheckpointRegistry;
pub use workflow::{CheckpointKind, WorkflowCheckpointStore, WorkflowCheckpoints};
