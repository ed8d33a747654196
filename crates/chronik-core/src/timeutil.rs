use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current UTC time as an RFC-3339 string. Used for every persisted
/// timestamp in the checkpoint and progress files.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Parse an RFC-3339 timestamp (any UTC offset).
pub fn parse_rfc3339(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).with_context(|| format!("invalid timestamp: \"{s}\""))
}

/// Compare two RFC-3339 timestamps; unparseable values sort first.
pub fn ts_le(a: &str, b: &str) -> bool {
    match (parse_rfc3339(a), parse_rfc3339(b)) {
        (Ok(a), Ok(b)) => a <= b,
        (Err(_), _) => true,
        (_, Err(_)) => false,
    }
}

/// Human-readable duration for log lines: "42s" or "3m12s".
pub fn format_elapsed(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m{}s", secs / 60, secs % 60)
    }
}
