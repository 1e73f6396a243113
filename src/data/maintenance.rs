//! Maintenance Scheduler (spec §4.7 "Maintenance scheduler (§I)", Component
//! I): a minute-granularity clock loop separate from the ETL ticker that
//! fires the daily purge at `PurgeHourUtc` and, on Sundays, index
//! maintenance at `IndexMaintenanceHourUtc`. Every action is audited to the
//! remediation log. Grounded on the same periodic-task shape as
//! `data::etl::EtlScheduler`; the chunked-delete-with-pause loop lives on
//! `RelationalStore::purge_raw_hits_older_than`.

use std::time::Duration;

use chrono::{Datelike, Timelike, Utc, Weekday};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{MAINTENANCE_PURGE_CHUNK_ROWS, MAINTENANCE_PURGE_PAUSE_SECS, MAINTENANCE_PURGE_RETENTION_DAYS};
use crate::data::store::RelationalStore;

const MAINTENANCE_TICK: Duration = Duration::from_secs(60);

pub struct MaintenanceScheduler {
    store: RelationalStore,
    purge_hour_utc: u8,
    index_maintenance_hour_utc: u8,
}

impl MaintenanceScheduler {
    pub fn new(store: RelationalStore, purge_hour_utc: u8, index_maintenance_hour_utc: u8) -> Self {
        Self {
            store,
            purge_hour_utc,
            index_maintenance_hour_utc,
        }
    }

    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MAINTENANCE_TICK);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_purge_date = None;
            let mut last_index_date = None;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("maintenance scheduler shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        let today = now.date_naive();

                        if now.hour() == self.purge_hour_utc as u32 && last_purge_date != Some(today) {
                            last_purge_date = Some(today);
                            self.run_daily_purge(now).await;
                        }

                        if now.weekday() == Weekday::Sun
                            && now.hour() == self.index_maintenance_hour_utc as u32
                            && last_index_date != Some(today)
                        {
                            last_index_date = Some(today);
                            self.run_weekly_index_maintenance(now).await;
                        }
                    }
                }
            }
        })
    }

    async fn run_daily_purge(&self, now: chrono::DateTime<Utc>) {
        let cutoff = now - chrono::Duration::days(MAINTENANCE_PURGE_RETENTION_DAYS);
        tracing::info!(cutoff = %cutoff, "starting daily raw-table purge");

        match self
            .store
            .purge_raw_hits_older_than(
                cutoff,
                MAINTENANCE_PURGE_CHUNK_ROWS,
                Duration::from_secs(MAINTENANCE_PURGE_PAUSE_SECS),
            )
            .await
        {
            Ok(deleted) => {
                tracing::info!(deleted, "daily purge complete");
                self.audit("purge", &format!("deleted rows older than {cutoff}"), deleted, now).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "daily purge failed");
                self.audit("purge_failed", &err.to_string(), 0, now).await;
            }
        }
    }

    /// Index maintenance itself is an opaque RPC against the external
    /// store's own tooling (spec §4.7: "rebuild if fragmentation > 30%,
    /// reorganize if > 10%, skip if > 100 pages") — those thresholds are
    /// evaluated by the stored procedure, not by this process. Forge's
    /// role is to fire it on schedule and audit the outcome.
    async fn run_weekly_index_maintenance(&self, now: chrono::DateTime<Utc>) {
        tracing::info!("starting weekly index maintenance");
        match self.store.call_etl_procedure("maintain_raw_hits_indexes").await {
            Ok(result) => {
                tracing::info!(rows_processed = result.rows_processed, "weekly index maintenance complete");
                self.audit(
                    "index_maintenance",
                    "weekly index maintenance",
                    result.rows_processed,
                    now,
                )
                .await;
            }
            Err(err) => {
                tracing::error!(error = %err, "weekly index maintenance failed");
                self.audit("index_maintenance_failed", &err.to_string(), 0, now).await;
            }
        }
    }

    async fn audit(&self, action: &str, details: &str, rows_affected: i64, now: chrono::DateTime<Utc>) {
        if let Err(err) = self.store.append_remediation_entry(action, details, rows_affected, now).await {
            tracing::warn!(error = %err, action, "failed to write remediation log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_cutoff_is_retention_days_in_the_past() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-07-28T03:00:00Z").unwrap().with_timezone(&Utc);
        let cutoff = now - chrono::Duration::days(MAINTENANCE_PURGE_RETENTION_DAYS);
        assert_eq!((now - cutoff).num_days(), MAINTENANCE_PURGE_RETENTION_DAYS);
    }
}
