//! Failover Replayer (spec §4.2, Component B): polls a spool directory
//! every N seconds for `failover_*.jsonl` files the edge wrote while forge
//! was unreachable, replays them onto `ChanEnrichment`, and archives each
//! file by renaming it to a `.done` suffix once fully read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{decode_line, enqueue_with_overflow_policy};
use crate::domain::record::TrackingRecord;

pub struct FailoverReplayer {
    directory: PathBuf,
    scan_interval: Duration,
}

impl FailoverReplayer {
    pub fn new(directory: PathBuf, scan_interval: Duration) -> Self {
        Self {
            directory,
            scan_interval,
        }
    }

    /// Periodic scan-and-replay loop, styled after the teacher's
    /// `start_health_check_task`: a plain `tokio::time::interval` driving a
    /// `tokio::select! { biased; ... }` against the shutdown signal.
    pub fn start(self, tx: mpsc::Sender<TrackingRecord>, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.scan_interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("failover replayer shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(err) = scan_once(&self.directory, &tx).await {
                            tracing::warn!(error = %err, "failover scan failed");
                        }
                    }
                }
            }
        })
    }
}

async fn scan_once(directory: &Path, tx: &mpsc::Sender<TrackingRecord>) -> std::io::Result<()> {
    let mut candidates = Vec::new();
    let mut dir = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if is_pending_failover_file(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();

    for path in candidates {
        replay_file(&path, tx).await;
    }
    Ok(())
}

fn is_pending_failover_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("failover_") && name.ends_with(".jsonl")
}

/// Stream-decode one spool file, enqueue every well-formed line, and
/// archive it with an atomic rename to `.done` once exhausted — even if
/// some lines along the way were malformed (spec §4.2: "the file is still
/// archived at EOF").
async fn replay_file(path: &Path, tx: &mpsc::Sender<TrackingRecord>) {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to open failover file");
            return;
        }
    };

    let mut lines = BufReader::new(file).lines();
    let mut replayed = 0u64;
    let mut malformed = 0u64;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decode_line(&line) {
                Some(record) => {
                    enqueue_with_overflow_policy(tx, record).await;
                    replayed += 1;
                }
                None => malformed += 1,
            },
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "error reading failover file, archiving what was read");
                break;
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        replayed,
        malformed,
        "failover file replayed"
    );

    let archived = path.with_extension("jsonl.done");
    if let Err(err) = tokio::fs::rename(path, &archived).await {
        tracing::warn!(path = %path.display(), error = %err, "failed to archive failover file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn recognizes_only_failover_jsonl_files() {
        assert!(is_pending_failover_file(Path::new("/spool/failover_001.jsonl")));
        assert!(!is_pending_failover_file(Path::new("/spool/failover_001.jsonl.done")));
        assert!(!is_pending_failover_file(Path::new("/spool/other.jsonl")));
    }

    #[tokio::test]
    async fn replay_file_archives_with_done_suffix_and_enqueues_good_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failover_20260101.jsonl");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        let good_line = r#"{"CompanyID":"42","PiXLID":"px1","IPAddress":"8.8.8.8","user_agent":"ua","referer":"r","query_string":"fp=a","request_path":"/p","headers_json":"{}","received_at":"2026-07-28T00:00:00Z"}"#;
        file.write_all(format!("{good_line}\nnot json\n").as_bytes()).await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let (tx, mut rx) = mpsc::channel(10);
        replay_file(&path, &tx).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(!path.exists());
        assert!(dir.path().join("failover_20260101.jsonl.done").exists());
    }
}
