//! Best-effort timestamp parsing for rollout records.

use chrono::{DateTime, Utc};

/// Parse a rollout timestamp string.
///
/// Accepts `YYYY-MM-DDTHH:MM:SS[.fff]Z` or an explicit offset. A trailing
/// `Z` is rewritten to `+00:00` before RFC 3339 parsing. Malformed or
/// missing input returns `None` rather than raising — timestamp parsing
/// never aborts a read.
#[must_use]
pub fn parse(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value.filter(|v| !v.is_empty())?;
    let normalized = if let Some(stripped) = value.strip_suffix('Z') {
        format!("{stripped}+00:00")
    } else {
        value.to_string()
    };
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_z() {
        let dt = parse(Some("2026-02-05T20:31:08.228Z")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-02-05T20:31:08.228+00:00");
    }

    #[test]
    fn parses_explicit_offset() {
        assert!(parse(Some("2026-02-05T20:31:08+02:00")).is_some());
    }

    #[test]
    fn returns_none_for_malformed_input() {
        assert!(parse(Some("not a timestamp")).is_none());
    }

    #[test]
    fn returns_none_for_missing_input() {
        assert!(parse(None).is_none());
        assert!(parse(Some("")).is_none());
    }
}
