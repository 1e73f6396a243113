//! `TrackingRecord`, the unit of work, and its `QueryString` carrier.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

use crate::core::constants::{MAX_HEADER_FIELD_CHARS, QUERY_STRING_HARD_CAP_BYTES};
use crate::utils::time::parse_iso_timestamp;

/// Characters that need escaping inside a `key=value` pair beyond what
/// `NON_ALPHANUMERIC` would do — kept narrow so already-encoded client
/// query strings don't get double-escaped.
const QUERY_VALUE_ESCAPE: &AsciiSet = &CONTROLS.add(b'&').add(b'=').add(b'%').add(b' ');

/// The wire shape sent by the edge, one JSON object per line (spec §6.1).
/// Field names follow the edge's casing exactly; `TrackingRecord::from`
/// normalizes them into the internal representation.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "CompanyID")]
    pub company_id: String,
    #[serde(rename = "PiXLID")]
    pub pixel_id: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    pub user_agent: String,
    pub referer: String,
    pub query_string: String,
    pub request_path: String,
    pub headers_json: String,
    pub received_at: String,
}

/// The unit of work traversing the pipeline. `query_string` is the only
/// field mutated after construction — every other field is set once at
/// the edge and never touched again (spec §3.1 invariant: `ReceivedAt` is
/// never overwritten).
#[derive(Debug, Clone, Serialize)]
pub struct TrackingRecord {
    pub company_id: String,
    pub pixel_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub referer: String,
    pub query_string: QueryString,
    pub headers_json: String,
    pub request_path: String,
    pub received_at: DateTime<Utc>,
}

impl From<WireRecord> for TrackingRecord {
    fn from(wire: WireRecord) -> Self {
        Self {
            company_id: wire.company_id,
            pixel_id: wire.pixel_id,
            ip_address: wire.ip_address,
            user_agent: truncate_header(wire.user_agent),
            referer: truncate_header(wire.referer),
            query_string: QueryString::from_client(wire.query_string),
            headers_json: wire.headers_json,
            request_path: wire.request_path,
            received_at: parse_iso_timestamp(&wire.received_at),
        }
    }
}

fn truncate_header(value: String) -> String {
    if value.chars().count() <= MAX_HEADER_FIELD_CHARS {
        value
    } else {
        value.chars().take(MAX_HEADER_FIELD_CHARS).collect()
    }
}

/// Ordered, append-only `k=v&` carrier. Client-provided pairs arrive as a
/// single opaque string; enrichment steps append further `_srv_*` pairs.
/// Tracks which `_srv_*` keys have been written so a later step can never
/// silently clobber an earlier one (spec §3.1 invariant).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct QueryString {
    raw: String,
    #[serde(skip)]
    written_srv_keys: HashSet<String>,
    #[serde(skip)]
    truncated: bool,
}

impl QueryString {
    pub fn from_client(raw: String) -> Self {
        Self {
            raw,
            written_srv_keys: HashSet::new(),
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Get a client-provided key's raw (not percent-decoded) value, used by
    /// enrichers that read device/locale signals out of the query string.
    pub fn get(&self, key: &str) -> Option<&str> {
        for pair in self.raw.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                if k == key {
                    return Some(v);
                }
            }
        }
        None
    }

    /// Append a `_srv_<key>=<urlencoded value>` pair. Panics in debug builds
    /// if `key` was already written by an earlier step — that would violate
    /// the append-only contract and is a programming error in the pipeline,
    /// not a runtime condition.
    pub fn append_srv(&mut self, key: &str, value: &str) {
        let first_write = self.written_srv_keys.insert(key.to_string());
        debug_assert!(
            first_write,
            "enrichment step attempted to overwrite _srv_{key}, which a prior step already wrote"
        );

        if !self.raw.is_empty() && !self.raw.ends_with('&') {
            self.raw.push('&');
        }
        self.raw.push_str("_srv_");
        self.raw.push_str(key);
        self.raw.push('=');
        self.raw
            .push_str(&utf8_percent_encode(value, QUERY_VALUE_ESCAPE).to_string());
        self.raw.push('&');

        self.enforce_cap();
    }

    /// Enforce the 32 KiB hard cap (spec §9 Open Question). Truncation is
    /// logged once per record, not once per append, to avoid log spam on a
    /// single pathological record.
    fn enforce_cap(&mut self) {
        if self.raw.len() <= QUERY_STRING_HARD_CAP_BYTES {
            return;
        }
        let mut cut = QUERY_STRING_HARD_CAP_BYTES;
        while cut > 0 && !self.raw.is_char_boundary(cut) {
            cut -= 1;
        }
        self.raw.truncate(cut);
        if !self.truncated {
            self.truncated = true;
            tracing::warn!(
                cap_bytes = QUERY_STRING_HARD_CAP_BYTES,
                "query string exceeded hard cap, truncating"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_srv_grows_monotonically() {
        let mut qs = QueryString::from_client("sw=2560&sh=1440".to_string());
        let before = qs.as_str().to_string();
        qs.append_srv("browser", "Chrome");
        assert!(qs.as_str().starts_with(&before));
        assert!(qs.as_str().contains("_srv_browser=Chrome"));
    }

    #[test]
    fn get_reads_client_provided_fields() {
        let qs = QueryString::from_client("cores=10&mem=16".to_string());
        assert_eq!(qs.get("cores"), Some("10"));
        assert_eq!(qs.get("missing"), None);
    }

    #[test]
    fn values_are_percent_encoded() {
        let mut qs = QueryString::default();
        qs.append_srv("botName", "Googlebot & Friends");
        assert!(qs.as_str().contains("Googlebot%20%26%20Friends"));
    }

    #[test]
    #[should_panic]
    fn overwriting_a_srv_key_panics_in_debug() {
        let mut qs = QueryString::default();
        qs.append_srv("browser", "Chrome");
        qs.append_srv("browser", "Firefox");
    }

    #[test]
    fn hard_cap_truncates_and_flags_once() {
        let mut qs = QueryString::default();
        for i in 0..5000 {
            qs.append_srv(&format!("k{i}"), "some moderately long enrichment value");
        }
        assert!(qs.as_str().len() <= QUERY_STRING_HARD_CAP_BYTES);
        assert!(qs.was_truncated());
    }

    #[test]
    fn wire_record_truncates_oversized_headers() {
        let long_ua = "A".repeat(MAX_HEADER_FIELD_CHARS + 500);
        let wire = WireRecord {
            company_id: "42".to_string(),
            pixel_id: "px".to_string(),
            ip_address: "8.8.8.8".to_string(),
            user_agent: long_ua,
            referer: String::new(),
            query_string: String::new(),
            request_path: "/p".to_string(),
            headers_json: "{}".to_string(),
            received_at: "2026-07-28T00:00:00Z".to_string(),
        };
        let record: TrackingRecord = wire.into();
        assert_eq!(record.user_agent.chars().count(), MAX_HEADER_FIELD_CHARS);
    }
}
