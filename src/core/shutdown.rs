//! Cooperative shutdown: a broadcast flag plus a registry of task handles.
//!
//! Adapted from the teacher's `core/shutdown.rs`. The teacher's version also
//! knows how to checkpoint and close two specific database services; this
//! version owns nothing domain-specific — it only broadcasts the signal and
//! waits for whichever handles were registered, so it works unchanged for
//! the transport listener, failover replayer, pipeline, bulk writer, ETL
//! scheduler, and maintenance scheduler alike.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ShutdownService {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to the shutdown flag. Every long-lived task holds one of
    /// these and checks it in its `tokio::select!` loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Register a task's `JoinHandle` so `shutdown()` can await it.
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().await.push(handle);
    }

    /// Flip the shutdown flag. Idempotent — calling this twice is a no-op
    /// the second time.
    pub fn trigger(&self) {
        if !*self.tx.borrow() {
            tracing::info!("shutdown triggered");
            let _ = self.tx.send(true);
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Trigger shutdown and wait for every registered task to finish,
    /// up to `timeout`. Tasks still running past the deadline are
    /// abandoned (their `JoinHandle` is simply dropped); the process exit
    /// is not blocked on them.
    pub async fn shutdown(&self, timeout: Duration) {
        self.trigger();

        let mut handles = self.handles.lock().await;
        let drained: Vec<_> = handles.drain(..).collect();
        drop(handles);

        let join_all = futures::future::join_all(drained);
        match tokio::time::timeout(timeout, join_all).await {
            Ok(results) => {
                for result in results {
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "task panicked during shutdown drain");
                    }
                }
                tracing::info!("shutdown drain complete");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "shutdown drain timed out; abandoning remaining tasks"
                );
            }
        }
    }

    /// Block until shutdown is triggered by someone else (a signal handler
    /// or a fatal error path), for callers that just want to await the
    /// process lifetime.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Install Ctrl+C and (on Unix) SIGTERM handlers that trigger shutdown.
    /// Must be called before any long blocking call on the main task.
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                {
                    Ok(s) => s,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to install SIGTERM handler");
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("received SIGINT");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("received SIGTERM");
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("received ctrl-c");
            }
            service.trigger();
        });
    }
}

impl Default for ShutdownService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_shutdown() -> ShutdownService {
        ShutdownService::new()
    }

    #[tokio::test]
    async fn trigger_is_observable_via_subscribe() {
        let service = make_shutdown();
        let mut rx = service.subscribe();
        assert!(!*rx.borrow());
        service.trigger();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn trigger_is_idempotent() {
        let service = make_shutdown();
        service.trigger();
        service.trigger();
        assert!(service.is_triggered());
    }

    #[tokio::test]
    async fn shutdown_awaits_registered_handles() {
        let service = make_shutdown();
        let mut rx = service.subscribe();
        let handle = tokio::spawn(async move {
            let _ = rx.changed().await;
        });
        service.register(handle).await;
        service.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_times_out_on_a_hanging_task() {
        let service = make_shutdown();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        service.register(handle).await;
        let started = tokio::time::Instant::now();
        service.shutdown(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
