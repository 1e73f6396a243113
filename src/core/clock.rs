//! Injectable clock, per spec.md §9 "Determinism in tests".
//!
//! The stateful enrichers (session stitching, cross-customer windows, the
//! dead-internet index, behavioral replay) all reason about elapsed wall
//! time. Calling `Utc::now()` directly from those makes their window/eviction
//! logic impossible to test without real sleeps, so every stateful enricher
//! takes a `Arc<dyn Clock>` instead.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to. `set`/`advance` are useful from
/// a single test thread; the timestamp itself is an atomic so the clock can
/// be shared behind an `Arc` into async tasks without a lock.
pub struct ManualClock {
    micros_since_epoch: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            micros_since_epoch: AtomicI64::new(start.timestamp_micros()),
        })
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.micros_since_epoch.store(at.timestamp_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.micros_since_epoch
            .fetch_add(delta.num_microseconds().unwrap_or(0), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.micros_since_epoch.load(Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_deterministically() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = clock.now();
        assert!(second >= first);
    }
}
