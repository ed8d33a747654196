use std::path::PathBuf;
use thiserror::Error;

/// Failure while resolving a chronological range. Always carries the
/// attempted range so the run's terminal failure record can name it;
/// extraction never returns a silently truncated result.
#[derive(Debug, Error)]
pub enum RangeExtractionError {
    #[error("git history query failed for range {range}: {message}")]
    Query { range: String, message: String },

    #[error("invalid commit reference \"{sha}\"")]
    InvalidSha { sha: String },

    #[error("session scan failed under {}: {source}", dir.display())]
    SessionScan {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_names_the_range() {
        let err = RangeExtractionError::Query {
            range: "abc..def".into(),
            message: "bad object".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc..def"));
        assert!(msg.contains("bad object"));
    }
}
