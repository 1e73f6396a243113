//! Cross-customer intel (spec §4.5.2, step 8): keyed by `(IP, FingerprintHash)`,
//! tracks which tenants have seen this device recently and alerts when the
//! same device is shared across 3+ companies within a 5-minute window.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::clock::Clock;
use crate::core::constants::{
    CROSS_CUSTOMER_ALERT_THRESHOLD, CROSS_CUSTOMER_ALERT_WINDOW_SECS, CROSS_CUSTOMER_WINDOW_SECS,
};

#[derive(Debug, Clone)]
pub struct CrossCustomerResult {
    pub distinct_companies_2h: usize,
    pub is_alert: bool,
}

pub struct CrossCustomerIntel {
    /// Key: (ip, fingerprint-hash) -> append-only list of (company_id, hit_at),
    /// pruned to the 2h window on every access.
    hits: DashMap<(String, u64), Vec<(String, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl CrossCustomerIntel {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            hits: DashMap::new(),
            clock,
        }
    }

    pub fn record(&self, ip: &str, fingerprint: &str, company_id: &str) -> CrossCustomerResult {
        let now = self.clock.now();
        let key = (ip.to_string(), hash_fingerprint(fingerprint));
        let window = chrono::Duration::seconds(CROSS_CUSTOMER_WINDOW_SECS);
        let alert_window = chrono::Duration::seconds(CROSS_CUSTOMER_ALERT_WINDOW_SECS);

        let mut entry = self.hits.entry(key).or_default();
        entry.push((company_id.to_string(), now));
        entry.retain(|(_, at)| now - *at <= window);

        let distinct_2h: std::collections::HashSet<&str> =
            entry.iter().map(|(company, _)| company.as_str()).collect();

        let distinct_recent: std::collections::HashSet<&str> = entry
            .iter()
            .filter(|(_, at)| now - *at <= alert_window)
            .map(|(company, _)| company.as_str())
            .collect();

        CrossCustomerResult {
            distinct_companies_2h: distinct_2h.len(),
            is_alert: distinct_recent.len() >= CROSS_CUSTOMER_ALERT_THRESHOLD,
        }
    }

    /// Drop keys whose hit list is now empty — a key only empties once every
    /// hit has aged out of the 2h window (spec: "Eviction every 5 minutes:
    /// prune empty hit lists").
    pub fn evict_empty(&self) -> usize {
        let now = self.clock.now();
        let window = chrono::Duration::seconds(CROSS_CUSTOMER_WINDOW_SECS);
        let before = self.hits.len();
        self.hits.retain(|_, hits| {
            hits.retain(|(_, at)| now - *at <= window);
            !hits.is_empty()
        });
        before - self.hits.len()
    }
}

fn hash_fingerprint(fingerprint: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    fingerprint.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn make(now: DateTime<Utc>) -> (CrossCustomerIntel, Arc<ManualClock>) {
        let clock = ManualClock::new(now);
        (CrossCustomerIntel::new(clock.clone()), clock)
    }

    #[test]
    fn single_company_never_alerts() {
        let (intel, _clock) = make(Utc::now());
        let result = intel.record("1.2.3.4", "fp_shared", "A");
        assert_eq!(result.distinct_companies_2h, 1);
        assert!(!result.is_alert);
    }

    #[test]
    fn three_companies_within_five_minutes_alerts() {
        let (intel, clock) = make(Utc::now());
        intel.record("1.2.3.4", "fp_shared", "A");
        clock.advance(chrono::Duration::minutes(1));
        intel.record("1.2.3.4", "fp_shared", "B");
        clock.advance(chrono::Duration::minutes(1));
        let result = intel.record("1.2.3.4", "fp_shared", "C");
        assert_eq!(result.distinct_companies_2h, 3);
        assert!(result.is_alert);
    }

    #[test]
    fn hits_outside_the_two_hour_window_are_pruned() {
        let (intel, clock) = make(Utc::now());
        intel.record("1.2.3.4", "fp_shared", "A");
        clock.advance(chrono::Duration::hours(3));
        let result = intel.record("1.2.3.4", "fp_shared", "B");
        assert_eq!(result.distinct_companies_2h, 1);
    }

    #[test]
    fn eviction_drops_fully_aged_out_keys() {
        let (intel, clock) = make(Utc::now());
        intel.record("1.2.3.4", "fp_shared", "A");
        clock.advance(chrono::Duration::hours(3));
        let evicted = intel.evict_empty();
        assert_eq!(evicted, 1);
    }
}
