//! Bulk Writer (spec §4.6, Component F): single-reader consumer of
//! `ChanWriter`. Batches by size-or-time, bulk-inserts into the raw table,
//! and gates every attempt behind a three-state circuit breaker. Modeled
//! on `domain::pipeline::Pipeline::start`'s `biased select! + drain` shape,
//! with the breaker itself adapted from
//! `Wandalen-api_llm`'s `circuit_breaker.rs` — same three states, but
//! plain fields instead of `Mutex`-guarded ones, since spec §9 notes every
//! transition happens inside this task's own loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::clock::Clock;
use crate::core::config::WriterConfig;
use crate::core::constants::{
    CIRCUIT_FAILURE_THRESHOLD, CIRCUIT_FAILURE_WINDOW_SECS, CIRCUIT_OPEN_COOLDOWN_SECS,
};
use crate::data::store::RelationalStore;
use crate::domain::record::TrackingRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Three-state gate in front of bulk writes (spec §4.6). Owned exclusively
/// by `BulkWriter`'s task loop — every mutating call happens from there, so
/// plain fields (no `Mutex`/atomics) are enough per spec §9's design note.
pub struct CircuitBreaker {
    clock: Arc<dyn Clock>,
    state: CircuitState,
    consecutive_failures: u32,
    window_started_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    half_open_probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window_started_at: None,
            opened_at: None,
            half_open_probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Decide whether the next batch attempt should even be tried.
    /// Transitions `Open` -> `HalfOpen` once the cooldown has elapsed and
    /// admits exactly one in-flight probe at a time in `HalfOpen`.
    pub fn should_allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or_else(|| self.clock.now());
                let elapsed = self.clock.now() - opened_at;
                if elapsed >= chrono::Duration::seconds(CIRCUIT_OPEN_COOLDOWN_SECS as i64) {
                    tracing::info!("circuit breaker half-open, admitting one probe attempt");
                    self.state = CircuitState::HalfOpen;
                    self.half_open_probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_probe_in_flight {
                    false
                } else {
                    self.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            tracing::info!("circuit breaker probe succeeded, closing");
            self.state = CircuitState::Closed;
        }
        self.consecutive_failures = 0;
        self.window_started_at = None;
        self.half_open_probe_in_flight = false;
    }

    pub fn record_failure(&mut self) {
        let now = self.clock.now();
        self.half_open_probe_in_flight = false;

        if self.state == CircuitState::HalfOpen {
            tracing::warn!("circuit breaker probe failed, re-opening");
            self.trip(now);
            return;
        }

        let window_start = *self.window_started_at.get_or_insert(now);
        if now - window_start > chrono::Duration::seconds(CIRCUIT_FAILURE_WINDOW_SECS) {
            // previous failures aged out; this one starts a fresh window.
            self.window_started_at = Some(now);
            self.consecutive_failures = 1;
        } else {
            self.consecutive_failures += 1;
        }

        if self.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD {
            self.trip(now);
        }
    }

    fn trip(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        tracing::error!(
            consecutive_failures = self.consecutive_failures,
            "circuit breaker open, bulk writes failing fast"
        );
    }

    /// Manual reset hook (spec §4.6: "External manual reset via HTTP
    /// endpoint") — the HTTP surface itself lives outside this crate's
    /// scope (spec §1 places dashboard/API endpoints out of scope); this
    /// is the seam such an endpoint would call into.
    pub fn reset(&mut self) {
        tracing::info!("circuit breaker manually reset");
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.window_started_at = None;
        self.opened_at = None;
        self.half_open_probe_in_flight = false;
    }
}

pub struct BulkWriter {
    store: RelationalStore,
    batch_size: usize,
    batch_flush: Duration,
    bulk_copy_timeout: Duration,
    shutdown_timeout: Duration,
    dead_letter_directory: PathBuf,
    clock: Arc<dyn Clock>,
}

impl BulkWriter {
    pub fn new(store: RelationalStore, config: &WriterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            batch_size: config.batch_size.max(1),
            batch_flush: Duration::from_millis(config.batch_flush_ms),
            bulk_copy_timeout: Duration::from_secs(config.bulk_copy_timeout_seconds),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_seconds),
            dead_letter_directory: config.dead_letter_directory.clone(),
            clock,
        }
    }

    pub fn start(
        self,
        mut rx: mpsc::Receiver<TrackingRecord>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut breaker = CircuitBreaker::new(self.clock.clone());
            let mut batch: Vec<TrackingRecord> = Vec::with_capacity(self.batch_size);
            let mut flush_timer = tokio::time::interval(self.batch_flush);
            flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("bulk writer received shutdown, draining");
                            break;
                        }
                    }
                    received = rx.recv() => {
                        match received {
                            Some(record) => {
                                batch.push(record);
                                if batch.len() >= self.batch_size {
                                    self.flush(&mut batch, &mut breaker).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = flush_timer.tick() => {
                        if !batch.is_empty() {
                            self.flush(&mut batch, &mut breaker).await;
                        }
                    }
                }
            }

            self.drain(rx, &mut batch, &mut breaker).await;
            tracing::debug!("bulk writer shutdown complete");
        })
    }

    /// Drain whatever is left in `rx` (and the in-flight `batch`) up to
    /// `shutdown_timeout`, flushing in batch-sized chunks; log the
    /// abandoned count if the deadline runs out first (spec §4.6).
    async fn drain(
        &self,
        mut rx: mpsc::Receiver<TrackingRecord>,
        batch: &mut Vec<TrackingRecord>,
        breaker: &mut CircuitBreaker,
    ) {
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                let abandoned = batch.len() + rx.len();
                if abandoned > 0 {
                    tracing::warn!(abandoned, "shutdown drain deadline exceeded, abandoning records");
                }
                return;
            }

            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(record)) => {
                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        self.flush(batch, breaker).await;
                    }
                }
                Ok(None) => {
                    if !batch.is_empty() {
                        self.flush(batch, breaker).await;
                    }
                    return;
                }
                Err(_) => {
                    if !batch.is_empty() {
                        self.flush(batch, breaker).await;
                    }
                    return;
                }
            }
        }
    }

    async fn flush(&self, batch: &mut Vec<TrackingRecord>, breaker: &mut CircuitBreaker) {
        if batch.is_empty() {
            return;
        }
        let records = std::mem::take(batch);

        if !breaker.should_allow() {
            tracing::warn!(count = records.len(), "circuit open, dead-lettering batch");
            self.dead_letter(&records).await;
            return;
        }

        let attempt = tokio::time::timeout(self.bulk_copy_timeout, self.store.insert_raw_batch(&records)).await;
        match attempt {
            Ok(Ok(rows)) => {
                breaker.record_success();
                tracing::debug!(rows, "bulk insert succeeded");
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, count = records.len(), "bulk insert failed");
                breaker.record_failure();
                self.dead_letter(&records).await;
            }
            Err(_) => {
                tracing::error!(count = records.len(), "bulk insert timed out");
                breaker.record_failure();
                self.dead_letter(&records).await;
            }
        }
    }

    /// Append a dropped batch to today's dead-letter JSONL spool (spec
    /// §4.6: "record dropped after attempted JSONL dead-letter write to
    /// disk" — the attempt itself is best-effort, a write failure here is
    /// only logged, never escalated).
    async fn dead_letter(&self, records: &[TrackingRecord]) {
        if let Err(err) = tokio::fs::create_dir_all(&self.dead_letter_directory).await {
            tracing::warn!(error = %err, "failed to create dead-letter directory");
            return;
        }

        let path = dead_letter_path(&self.dead_letter_directory, self.clock.now());
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await;
        let mut file = match file {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to open dead-letter spool");
                return;
            }
        };

        for record in records {
            let Ok(line) = serde_json::to_string(record) else {
                continue;
            };
            if let Err(err) = file.write_all(line.as_bytes()).await {
                tracing::warn!(error = %err, "failed writing dead-letter record");
                return;
            }
            let _ = file.write_all(b"\n").await;
        }
    }
}

fn dead_letter_path(directory: &Path, now: DateTime<Utc>) -> PathBuf {
    directory.join(format!("dead_letter_{}.jsonl", now.format("%Y_%m_%d")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = ManualClock::new(Utc::now());
        (CircuitBreaker::new(clock.clone()), clock)
    }

    #[test]
    fn closed_allows_and_stays_closed_on_success() {
        let (mut cb, _clock) = breaker();
        assert!(cb.should_allow());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        let (mut cb, _clock) = breaker();
        for _ in 0..CIRCUIT_FAILURE_THRESHOLD {
            assert!(cb.should_allow());
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn half_opens_after_cooldown_and_closes_on_success() {
        let (mut cb, clock) = breaker();
        for _ in 0..CIRCUIT_FAILURE_THRESHOLD {
            cb.should_allow();
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(chrono::Duration::seconds(CIRCUIT_OPEN_COOLDOWN_SECS as i64 + 1));
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_half_open_probe_reopens() {
        let (mut cb, clock) = breaker();
        for _ in 0..CIRCUIT_FAILURE_THRESHOLD {
            cb.should_allow();
            cb.record_failure();
        }
        clock.advance(chrono::Duration::seconds(CIRCUIT_OPEN_COOLDOWN_SECS as i64 + 1));
        assert!(cb.should_allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn manual_reset_forces_closed() {
        let (mut cb, _clock) = breaker();
        for _ in 0..CIRCUIT_FAILURE_THRESHOLD {
            cb.should_allow();
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow());
    }

    #[test]
    fn dead_letter_path_is_daily_bucketed() {
        let now = DateTime::parse_from_rfc3339("2026-07-28T10:00:00Z").unwrap().with_timezone(&Utc);
        let path = dead_letter_path(Path::new("/tmp/dl"), now);
        assert_eq!(path, PathBuf::from("/tmp/dl/dead_letter_2026_07_28.jsonl"));
    }
}
