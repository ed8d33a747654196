pub mod batch;
pub mod error;
pub mod git;
pub mod sessions;

pub use batch::{plan_batches, sessions_in_range, PlannedBatch};
pub use error::RangeExtractionError;
pub use git::{extract_range, extract_shas, extract_since, Extraction};
pub use sessions::extract_sessions;
