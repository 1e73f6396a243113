//! Stateful enrichment services (spec §4.5, Component E).
//!
//! Each submodule owns a concurrently-accessed map keyed on some dimension
//! of the record (fingerprint, IP, company) and reasons about a rolling
//! time window — unlike `domain::enrich`, whose services are read-only
//! per record. `StatefulContext` bundles one instance of each, sharing a
//! single injected clock so a pipeline-level eviction sweep can run all of
//! them off one tick.

pub mod behavioral_replay;
pub mod contradiction;
pub mod cross_customer;
pub mod dead_internet;
pub mod device_age;
pub mod geo_arbitrage;
pub mod session;

use std::sync::Arc;

use behavioral_replay::BehavioralReplayDetector;
use cross_customer::CrossCustomerIntel;
use dead_internet::DeadInternetIndex;
use session::SessionStitcher;

use crate::core::clock::Clock;

pub use contradiction::{evaluate as evaluate_contradictions, ContradictionInputs, ContradictionResult, Severity};
pub use device_age::{estimate as estimate_device_age, DeviceAgeResult};
pub use geo_arbitrage::{evaluate as evaluate_geo_arbitrage, GeoArbitrageInputs, GeoArbitrageResult};

/// Every stateful enrichment service, constructed once at startup and held
/// for the process lifetime behind an `Arc` so both the pipeline worker and
/// the housekeeping sweep can reach it.
pub struct StatefulContext {
    pub session: SessionStitcher,
    pub cross_customer: CrossCustomerIntel,
    pub replay: BehavioralReplayDetector,
    pub dead_internet: DeadInternetIndex,
}

impl StatefulContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            session: SessionStitcher::new(clock.clone()),
            cross_customer: CrossCustomerIntel::new(clock.clone()),
            replay: BehavioralReplayDetector::new(),
            dead_internet: DeadInternetIndex::new(clock),
        }
    }

    /// Run every submodule's eviction sweep. Called by the pipeline's
    /// housekeeping task on its own cadence per service (spec §4.5: session
    /// every 2 min, cross-customer every 5 min, dead-internet every 10
    /// min) — callers that want a single interval for all three can just
    /// call this on the tightest one, since each sweep is a cheap no-op
    /// when nothing has aged out.
    pub fn evict_all(&self) -> EvictionReport {
        EvictionReport {
            sessions_evicted: self.session.evict_stale(),
            cross_customer_keys_evicted: self.cross_customer.evict_empty(),
            dead_internet_companies_evicted: self.dead_internet.evict(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionReport {
    pub sessions_evicted: usize,
    pub cross_customer_keys_evicted: usize,
    pub dead_internet_companies_evicted: usize,
}
