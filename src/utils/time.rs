//! Timestamp parsing helpers shared by the transport decoders and the
//! enrichment pipeline.

use chrono::{DateTime, Utc};

/// Parse an RFC3339 timestamp (the wire format for `ReceivedAt` and any
/// edge-supplied timestamp field). Falls back to the Unix epoch and logs a
/// warning on malformed input rather than failing the whole record — a
/// single bad timestamp should not drop an otherwise-valid hit.
pub fn parse_iso_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|err| {
            tracing::warn!(raw, error = %err, "failed to parse timestamp, falling back to epoch");
            DateTime::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_rfc3339() {
        let parsed = parse_iso_timestamp("2026-07-28T12:30:00Z");
        assert_eq!(parsed.to_rfc3339(), "2026-07-28T12:30:00+00:00");
    }

    #[test]
    fn falls_back_to_epoch_on_garbage() {
        let parsed = parse_iso_timestamp("not-a-timestamp");
        assert_eq!(parsed, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn falls_back_to_epoch_on_empty_string() {
        let parsed = parse_iso_timestamp("");
        assert_eq!(parsed, DateTime::UNIX_EPOCH);
    }
}
