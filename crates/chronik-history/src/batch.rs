//! Chronological batch planning.
//!
//! A batch is a contiguous, oldest-first slice of the extracted history.
//! Numbering is 1-based and continues across runs via `first_number`, so
//! a resumed workflow keeps the ledger's monotonic ordering.

use chronik_core::timeutil::ts_le;
use chronik_core::{CommitRange, CommitRecord, DateRange, SessionRecord};

/// One planned slice of history, ready to hand to the processing pipeline.
#[derive(Debug, Clone)]
pub struct PlannedBatch {
    pub number: u64,
    pub commits: Vec<CommitRecord>,
    pub commit_range: CommitRange,
    pub date_range: DateRange,
}

/// Partition oldest-first `commits` into numbered chronological slices of
/// at most `batch_size`, starting at `first_number`.
pub fn plan_batches(
    commits: Vec<CommitRecord>,
    batch_size: usize,
    first_number: u64,
) -> Vec<PlannedBatch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut iter = commits.into_iter().peekable();
    let mut number = first_number;

    while iter.peek().is_some() {
        let slice: Vec<CommitRecord> = iter.by_ref().take(batch_size).collect();
        let first = slice.first().expect("slice is non-empty");
        let last = slice.last().expect("slice is non-empty");
        batches.push(PlannedBatch {
            number,
            commit_range: CommitRange {
                start: first.hash.clone(),
                end: last.hash.clone(),
            },
            date_range: DateRange {
                start: first.date.clone(),
                end: last.date.clone(),
            },
            commits: slice,
        });
        number += 1;
    }
    batches
}

/// Sessions whose start timestamp falls inside `range` (inclusive).
/// Used to attach session records to the batch covering their window.
pub fn sessions_in_range(sessions: &[SessionRecord], range: &DateRange) -> Vec<SessionRecord> {
    sessions
        .iter()
        .filter(|s| ts_le(&range.start, &s.started_at) && ts_le(&s.started_at, &range.end))
        .cloned()
        .collect()
}
