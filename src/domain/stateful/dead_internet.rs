//! Dead-internet index (spec §4.5.7, step 14): per-tenant hour-bucketed
//! traffic-quality aggregates over a rolling 24-hour window, summarized
//! into a single 0-100 "how dead is this traffic" score.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::clock::Clock;
use crate::core::constants::{
    DEAD_INTERNET_IDLE_EVICTION_HOURS, DEAD_INTERNET_MIN_HITS_FOR_INDEX, DEAD_INTERNET_WINDOW_HOURS,
};

#[derive(Debug, Clone, Default)]
pub struct HitSignals {
    pub is_bot: bool,
    pub zero_mouse: bool,
    pub is_datacenter: bool,
    pub has_contradiction: bool,
    pub is_replay: bool,
}

#[derive(Debug, Clone, Default)]
struct HourBucket {
    total_hits: u64,
    bot_hits: u64,
    zero_mouse_hits: u64,
    datacenter_hits: u64,
    contradiction_hits: u64,
    replay_hits: u64,
    unique_fingerprints: HashSet<String>,
}

#[derive(Debug, Default)]
struct CompanyState {
    buckets: HashMap<i64, HourBucket>,
    last_hit_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct DeadInternetResult {
    /// `None` until the window accumulates `DEAD_INTERNET_MIN_HITS_FOR_INDEX` hits.
    pub index: Option<u32>,
}

pub struct DeadInternetIndex {
    companies: DashMap<String, CompanyState>,
    clock: Arc<dyn Clock>,
}

impl DeadInternetIndex {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            companies: DashMap::new(),
            clock,
        }
    }

    pub fn record(&self, company_id: &str, fingerprint: &str, signals: &HitSignals) -> DeadInternetResult {
        let now = self.clock.now();
        let hour_bucket_key = now.timestamp() / 3600;

        let mut state = self.companies.entry(company_id.to_string()).or_default();
        state.last_hit_at = Some(now);

        let bucket = state.buckets.entry(hour_bucket_key).or_default();
        bucket.total_hits += 1;
        if signals.is_bot {
            bucket.bot_hits += 1;
        }
        if signals.zero_mouse {
            bucket.zero_mouse_hits += 1;
        }
        if signals.is_datacenter {
            bucket.datacenter_hits += 1;
        }
        if signals.has_contradiction {
            bucket.contradiction_hits += 1;
        }
        if signals.is_replay {
            bucket.replay_hits += 1;
        }
        bucket.unique_fingerprints.insert(fingerprint.to_string());

        let window_start = hour_bucket_key - DEAD_INTERNET_WINDOW_HOURS;
        let mut totals = HourBucket::default();
        for (key, bucket) in state.buckets.iter() {
            if *key > window_start {
                totals.total_hits += bucket.total_hits;
                totals.bot_hits += bucket.bot_hits;
                totals.zero_mouse_hits += bucket.zero_mouse_hits;
                totals.datacenter_hits += bucket.datacenter_hits;
                totals.contradiction_hits += bucket.contradiction_hits;
                totals.replay_hits += bucket.replay_hits;
                for fp in &bucket.unique_fingerprints {
                    totals.unique_fingerprints.insert(fp.clone());
                }
            }
        }

        if totals.total_hits < DEAD_INTERNET_MIN_HITS_FOR_INDEX {
            return DeadInternetResult { index: None };
        }

        DeadInternetResult {
            index: Some(compute_index(&totals)),
        }
    }

    /// Drop hour-buckets older than the window, and whole customer entries
    /// idle longer than the idle-eviction threshold (spec §4.5.7).
    pub fn evict(&self) -> usize {
        let now = self.clock.now();
        let hour_bucket_key = now.timestamp() / 3600;
        let window_start = hour_bucket_key - DEAD_INTERNET_WINDOW_HOURS;
        let idle_cutoff = now - chrono::Duration::hours(DEAD_INTERNET_IDLE_EVICTION_HOURS);

        let before = self.companies.len();
        self.companies.retain(|_, state| {
            state.buckets.retain(|key, _| *key > window_start);
            state.last_hit_at.map(|at| at > idle_cutoff).unwrap_or(false)
        });
        before - self.companies.len()
    }
}

fn compute_index(totals: &HourBucket) -> u32 {
    let total = totals.total_hits as f64;
    let bot_ratio = totals.bot_hits as f64 / total;
    let zero_engage_ratio = totals.zero_mouse_hits as f64 / total;
    let datacenter_ratio = totals.datacenter_hits as f64 / total;
    let contradiction_ratio = totals.contradiction_hits as f64 / total;
    let fp_diversity_ratio = 1.0 - (totals.unique_fingerprints.len() as f64 / total).min(1.0);

    let raw = 100.0
        * (0.30 * bot_ratio
            + 0.20 * zero_engage_ratio
            + 0.20 * datacenter_ratio
            + 0.15 * contradiction_ratio
            + 0.15 * fp_diversity_ratio);

    raw.round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn make() -> (DeadInternetIndex, Arc<ManualClock>) {
        let clock = ManualClock::new(Utc::now());
        (DeadInternetIndex::new(clock.clone()), clock)
    }

    #[test]
    fn index_stays_none_below_minimum_hit_threshold() {
        let (index, _clock) = make();
        for i in 0..4 {
            let result = index.record("42", &format!("fp{i}"), &HitSignals::default());
            assert!(result.index.is_none());
        }
    }

    #[test]
    fn all_bot_traffic_pushes_index_high() {
        let (index, _clock) = make();
        let bot_signals = HitSignals {
            is_bot: true,
            zero_mouse: true,
            is_datacenter: true,
            has_contradiction: true,
            is_replay: false,
        };
        let mut last = DeadInternetResult::default();
        for i in 0..10 {
            last = index.record("42", &format!("fp{i}"), &bot_signals);
        }
        assert!(last.index.unwrap() >= 80);
    }

    #[test]
    fn all_clean_traffic_keeps_index_low() {
        let (index, _clock) = make();
        let clean = HitSignals::default();
        let mut last = DeadInternetResult::default();
        for i in 0..10 {
            last = index.record("42", &format!("fp{i}"), &clean);
        }
        assert!(last.index.unwrap() <= 20);
    }

    #[test]
    fn eviction_drops_idle_companies() {
        let (index, clock) = make();
        index.record("42", "fp0", &HitSignals::default());
        clock.advance(chrono::Duration::hours(49));
        let evicted = index.evict();
        assert_eq!(evicted, 1);
    }
}
