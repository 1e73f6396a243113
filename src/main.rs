//! Process entry point: load config, wire every component (spec §2), run
//! until a shutdown signal, then drain. Modeled on the teacher's
//! `CoreApp::run`/`start_server`/`start_background_tasks` split, flattened
//! into one function since this process has no HTTP server of its own to
//! separate startup from serving.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use forge::core::clock::{Clock, SystemClock};
use forge::core::constants::SESSION_EVICTION_INTERVAL_SECS;
use forge::core::storage::resolve_directory;
use forge::core::{AppConfig, CliConfig, ShutdownService};
use forge::data::etl::EtlScheduler;
use forge::data::maintenance::MaintenanceScheduler;
use forge::data::store::RelationalStore;
use forge::data::writer::BulkWriter;
use forge::domain::enrich::EnrichContext;
use forge::domain::record::TrackingRecord;
use forge::domain::stateful::StatefulContext;
use forge::domain::Pipeline;
use forge::edge::EdgeHealthClient;
use forge::transport::{FailoverReplayer, TransportListener};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    forge::core::init_logging();

    let cli = CliConfig::parse();
    let config = AppConfig::load(&cli)?;
    tracing::info!(config = %config, "SmartPiXL Forge starting");

    let shutdown = ShutdownService::new();
    shutdown.install_signal_handlers();

    resolve_directory(&config.transport.failover_directory)?;
    resolve_directory(&config.writer.dead_letter_directory)?;

    let (tx_enrichment, rx_enrichment) = mpsc::channel::<TrackingRecord>(config.transport.pipe_channel_capacity);
    let (tx_writer, rx_writer) = mpsc::channel::<TrackingRecord>(config.transport.sql_writer_channel_capacity);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let enrich = Arc::new(EnrichContext::new(&config.enrichment));
    let stateful = Arc::new(StatefulContext::new(clock.clone()));

    let store = RelationalStore::connect(&config.writer).await?;

    if config.enrichment.enabled {
        if let Err(err) = enrich.external_geo.load_known_ips(store.pool()).await {
            tracing::warn!(error = %err, "failed to seed external geo known-IP cache, continuing without it");
        }
    }

    let edge_health = EdgeHealthClient::new(config.edge.base_url.clone());
    let startup_health = edge_health.health().await;
    tracing::info!(reachable = startup_health.is_reachable, "edge health checked at startup");

    // Component A — transport listener. Binding failure is the only fatal
    // startup error the listener contributes (spec §4.1).
    let listener = TransportListener::new(
        config.transport.pipe_name.clone(),
        config.transport.max_concurrent_pipe_instances,
    );
    for handle in listener.start(tx_enrichment.clone(), shutdown.subscribe()).await? {
        shutdown.register(handle).await;
    }

    // Component B — failover replayer.
    let failover = FailoverReplayer::new(
        config.transport.failover_directory.clone(),
        Duration::from_secs(config.transport.failover_scan_interval_seconds),
    );
    shutdown
        .register(failover.start(tx_enrichment.clone(), shutdown.subscribe()))
        .await;

    // Component C — enrichment pipeline, or a pass-through when disabled
    // (spec §6.5 `EnableEnrichments`).
    if config.enrichment.enabled {
        let pipeline = Pipeline::new(enrich.clone(), stateful.clone(), Some(store.pool().clone()), clock.clone());
        shutdown
            .register(pipeline.start(rx_enrichment, tx_writer.clone(), shutdown.subscribe()))
            .await;
    } else {
        tracing::warn!("enrichments disabled, pipeline is a pass-through");
        shutdown
            .register(spawn_passthrough(rx_enrichment, tx_writer.clone(), shutdown.subscribe()))
            .await;
    }

    // Housekeeping sweep for the stateful enrichers' eviction contracts
    // (spec §4.5: session every 2 min, cross-customer every 5 min,
    // dead-internet every 10 min) — run on the tightest cadence since each
    // sweep is a cheap no-op when nothing has aged out.
    shutdown
        .register(spawn_eviction_sweep(stateful.clone(), shutdown.subscribe()))
        .await;

    // Component F — bulk writer.
    let writer = BulkWriter::new(store.clone(), &config.writer, clock.clone());
    shutdown.register(writer.start(rx_writer, shutdown.subscribe())).await;

    // Component G — ETL scheduler.
    let etl = EtlScheduler::new(store.clone(), Duration::from_secs(config.etl.interval_seconds));
    shutdown.register(etl.start(shutdown.subscribe())).await;

    // Component I — maintenance scheduler.
    let maintenance = MaintenanceScheduler::new(
        store.clone(),
        config.etl.purge_hour_utc,
        config.etl.index_maintenance_hour_utc,
    );
    shutdown.register(maintenance.start(shutdown.subscribe())).await;

    tracing::info!("SmartPiXL Forge running");
    shutdown.wait().await;

    let drain_timeout = Duration::from_secs(config.writer.shutdown_timeout_seconds + 5);
    shutdown.shutdown(drain_timeout).await;

    Ok(())
}

/// `EnableEnrichments = false` path (spec §6.5): forward records untouched
/// from `ChanEnrichment` to `ChanWriter`, honoring the same shutdown-drain
/// shape as the real pipeline.
fn spawn_passthrough(
    mut rx: mpsc::Receiver<TrackingRecord>,
    tx: mpsc::Sender<TrackingRecord>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                received = rx.recv() => {
                    match received {
                        Some(record) => {
                            if tx.try_send(record).is_err() {
                                tracing::warn!("ChanWriter full, dropping record in pass-through mode");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    })
}

fn spawn_eviction_sweep(
    stateful: Arc<StatefulContext>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SESSION_EVICTION_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = stateful.evict_all();
                    tracing::debug!(
                        sessions_evicted = report.sessions_evicted,
                        cross_customer_keys_evicted = report.cross_customer_keys_evicted,
                        dead_internet_companies_evicted = report.dead_internet_companies_evicted,
                        "stateful enricher eviction sweep complete"
                    );
                }
            }
        }
    })
}
