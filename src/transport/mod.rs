//! Edge-facing ingestion (spec §4.1, §4.2 — Components A and B).
//!
//! Both components share one contract: decode NDJSON lines into
//! `TrackingRecord`s and enqueue them onto `ChanEnrichment` under the same
//! block-then-drop overflow policy. `listener` is the live path; `failover`
//! is the replay path for whatever the edge spooled to disk while forge was
//! unreachable.

pub mod failover;
pub mod listener;

pub use failover::FailoverReplayer;
pub use listener::TransportListener;

use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::constants::CHANNEL_OVERFLOW_BLOCK_MS;
use crate::domain::record::TrackingRecord;

/// Errors that abort startup entirely (spec §4.1 "Fatal only on inability
/// to bind the endpoint name at startup").
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind transport listener {name:?}: {source}")]
    Bind {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Enqueue onto `ChanEnrichment`, blocking for up to `CHANNEL_OVERFLOW_BLOCK_MS`
/// when the channel is full before dropping the record (spec §4.1/§4.2
/// overflow policy, shared by the listener and the failover replayer).
pub(crate) async fn enqueue_with_overflow_policy(
    tx: &mpsc::Sender<TrackingRecord>,
    record: TrackingRecord,
) {
    match tokio::time::timeout(Duration::from_millis(CHANNEL_OVERFLOW_BLOCK_MS), tx.send(record)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::warn!("ChanEnrichment closed, dropping record"),
        Err(_) => tracing::warn!(
            block_ms = CHANNEL_OVERFLOW_BLOCK_MS,
            "ChanEnrichment full past overflow window, dropping record"
        ),
    }
}

/// Parse one NDJSON line into a `TrackingRecord`. Returns `None` (and logs)
/// on malformed JSON — the caller decides whether that means "skip the line"
/// (failover) or "drop and keep the connection open" (listener); either way
/// it never aborts the surrounding loop (spec §4.1/§4.2 error policy).
pub(crate) fn decode_line(line: &str) -> Option<TrackingRecord> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<crate::domain::record::WireRecord>(line) {
        Ok(wire) => Some(wire.into()),
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed tracking record line");
            None
        }
    }
}
