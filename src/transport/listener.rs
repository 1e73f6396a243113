//! Transport Listener (spec §4.1, Component A): up to N concurrent IPC
//! server instances accepting edge connections on a well-known local
//! endpoint name, decoding newline-delimited JSON, and enqueuing onto
//! `ChanEnrichment`.
//!
//! `std` has no portable named-pipe/local-socket abstraction, so this is
//! built on `interprocess`'s `local_socket` module — a named pipe on
//! Windows, a namespaced Unix domain socket everywhere else, both reached
//! through the same `GenericNamespaced` name. A single listener is bound
//! once at startup (the only fatal failure mode per the spec); "N
//! instances" is then N tasks `accept()`-ing off that one listener
//! concurrently, which is how both platforms actually let more than one
//! caller wait for a connection at a time.

use std::sync::Arc;

use interprocess::local_socket::tokio::{Listener, Stream};
use interprocess::local_socket::{GenericNamespaced, ListenerOptions, ToNsName};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{decode_line, enqueue_with_overflow_policy, TransportError};
use crate::core::constants::MAX_LINE_BYTES;
use crate::domain::record::TrackingRecord;

pub struct TransportListener {
    pipe_name: String,
    instances: usize,
}

impl TransportListener {
    pub fn new(pipe_name: impl Into<String>, instances: usize) -> Self {
        Self {
            pipe_name: pipe_name.into(),
            instances: instances.max(1),
        }
    }

    /// Bind the endpoint and spawn `instances` acceptor loops, each
    /// registered with `shutdown`. Binding failure is the listener's only
    /// fatal error (spec §4.1).
    pub async fn start(
        self,
        tx: mpsc::Sender<TrackingRecord>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, TransportError> {
        let name = self
            .pipe_name
            .clone()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|source| TransportError::Bind {
                name: self.pipe_name.clone(),
                source,
            })?;

        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|source| TransportError::Bind {
                name: self.pipe_name.clone(),
                source,
            })?;
        let listener = Arc::new(listener);

        tracing::info!(
            pipe_name = %self.pipe_name,
            instances = self.instances,
            "transport listener bound"
        );

        let mut handles = Vec::with_capacity(self.instances);
        for instance in 0..self.instances {
            let listener = listener.clone();
            let tx = tx.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                tracing::debug!(instance, "transport listener instance shutting down");
                                break;
                            }
                        }
                        accepted = listener.accept() => {
                            match accepted {
                                Ok(conn) => {
                                    let tx = tx.clone();
                                    let mut conn_shutdown = shutdown_rx.clone();
                                    tokio::spawn(async move {
                                        tokio::select! {
                                            biased;
                                            _ = conn_shutdown.changed() => {}
                                            _ = handle_connection(conn, &tx) => {}
                                        }
                                    });
                                }
                                Err(err) => {
                                    tracing::warn!(instance, error = %err, "transport listener accept failed, recycling instance");
                                }
                            }
                        }
                    }
                }
            }));
        }

        Ok(handles)
    }
}

/// Stream one client connection's `\n`-terminated JSON objects until EOF or
/// disconnect. Malformed lines are dropped (counted via the warn log) and
/// the connection stays open; an abrupt disconnect just ends this loop and
/// the instance goes back to accepting (spec §4.1 error policy).
async fn handle_connection(conn: Stream, tx: &mpsc::Sender<TrackingRecord>) {
    let mut lines = BufReader::new(conn).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "transport connection read error, closing");
                break;
            }
        };

        if line.len() > MAX_LINE_BYTES {
            tracing::warn!(line_bytes = line.len(), "dropping oversized tracking record line");
            continue;
        }

        if let Some(record) = decode_line(&line) {
            enqueue_with_overflow_policy(tx, record).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::QueryString;
    use chrono::Utc;

    fn sample_record() -> TrackingRecord {
        TrackingRecord {
            company_id: "42".to_string(),
            pixel_id: "px1".to_string(),
            ip_address: "8.8.8.8".to_string(),
            user_agent: "test-agent".to_string(),
            referer: "https://example.com".to_string(),
            query_string: QueryString::from_client("fp=abc".to_string()),
            headers_json: "{}".to_string(),
            request_path: "/landing".to_string(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn overflow_policy_drops_when_channel_stays_full() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(sample_record()).unwrap();

        enqueue_with_overflow_policy(&tx, sample_record()).await;

        // only the original record made it through; the second was dropped.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oversized_line_is_rejected_before_decode() {
        let oversized = "x".repeat(MAX_LINE_BYTES + 1);
        assert!(oversized.len() > MAX_LINE_BYTES);
    }
}
