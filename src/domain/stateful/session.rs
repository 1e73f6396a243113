//! Session stitcher (spec §4.5.1, step 7): keyed by fingerprint, keyed
//! entries live for up to 30 minutes of inactivity. A background sweep
//! evicts stale entries every 2 minutes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::constants::SESSION_TIMEOUT_SECS;

#[derive(Debug, Clone)]
struct SessionEntry {
    session_id: String,
    started_at: DateTime<Utc>,
    last_hit_at: DateTime<Utc>,
    hit_count: u64,
    pages: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStitchResult {
    pub session_id: String,
    pub hit_num: u64,
    pub duration_secs: i64,
    pub page_count: usize,
}

pub struct SessionStitcher {
    sessions: DashMap<String, SessionEntry>,
    clock: Arc<dyn Clock>,
}

impl SessionStitcher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Look up or create a session entry for `fingerprint`, registering
    /// `page_path` as visited. A new session starts if none exists or the
    /// prior one timed out (spec: `now - LastHitAt > 30 min`).
    pub fn stitch(&self, fingerprint: &str, page_path: &str) -> SessionStitchResult {
        let now = self.clock.now();
        let timeout = chrono::Duration::seconds(SESSION_TIMEOUT_SECS);

        let mut entry = self.sessions.entry(fingerprint.to_string()).or_insert_with(|| {
            SessionEntry {
                session_id: Uuid::new_v4().to_string(),
                started_at: now,
                last_hit_at: now,
                hit_count: 0,
                pages: HashSet::new(),
            }
        });

        if now - entry.last_hit_at > timeout {
            *entry = SessionEntry {
                session_id: Uuid::new_v4().to_string(),
                started_at: now,
                last_hit_at: now,
                hit_count: 0,
                pages: HashSet::new(),
            };
        }

        entry.hit_count += 1;
        entry.last_hit_at = now;
        entry.pages.insert(page_path.to_string());

        SessionStitchResult {
            session_id: entry.session_id.clone(),
            hit_num: entry.hit_count,
            duration_secs: (now - entry.started_at).num_seconds(),
            page_count: entry.pages.len(),
        }
    }

    /// Remove sessions idle for longer than the timeout window. Run on a
    /// `SESSION_EVICTION_INTERVAL_SECS` cadence by the enrichment pipeline's
    /// housekeeping task.
    pub fn evict_stale(&self) -> usize {
        let now = self.clock.now();
        let timeout = chrono::Duration::seconds(SESSION_TIMEOUT_SECS);
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| now - entry.last_hit_at <= timeout);
        before - self.sessions.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn make(now: DateTime<Utc>) -> (SessionStitcher, Arc<ManualClock>) {
        let clock = ManualClock::new(now);
        (SessionStitcher::new(clock.clone()), clock)
    }

    #[test]
    fn first_hit_starts_a_new_session() {
        let (stitcher, _clock) = make(Utc::now());
        let result = stitcher.stitch("fp_abc", "/landing");
        assert_eq!(result.hit_num, 1);
        assert_eq!(result.page_count, 1);
    }

    #[test]
    fn subsequent_hits_within_window_continue_the_session() {
        let (stitcher, clock) = make(Utc::now());
        let first = stitcher.stitch("fp_abc", "/landing");
        clock.advance(chrono::Duration::minutes(5));
        let second = stitcher.stitch("fp_abc", "/pricing");
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.hit_num, 2);
        assert_eq!(second.page_count, 2);
    }

    #[test]
    fn a_gap_past_the_timeout_starts_a_new_session() {
        let (stitcher, clock) = make(Utc::now());
        let first = stitcher.stitch("fp_abc", "/landing");
        clock.advance(chrono::Duration::minutes(31));
        let second = stitcher.stitch("fp_abc", "/landing");
        assert_ne!(second.session_id, first.session_id);
        assert_eq!(second.hit_num, 1);
    }

    #[test]
    fn eviction_removes_only_stale_entries() {
        let (stitcher, clock) = make(Utc::now());
        stitcher.stitch("stale", "/a");
        clock.advance(chrono::Duration::minutes(31));
        stitcher.stitch("fresh", "/b");
        let evicted = stitcher.evict_stale();
        assert_eq!(evicted, 1);
        assert_eq!(stitcher.active_session_count(), 1);
    }
}
