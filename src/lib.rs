//! SmartPiXL Forge: edge-capture enrichment and ingestion engine.
//!
//! Module layout mirrors the teacher's split: `core` for process wiring
//! (config, CLI, shutdown, clock), `data` for persistence and the
//! scheduled downstream phases, `domain` for the enrichment pipeline and
//! its services, `transport` for the edge-facing ingestion components, and
//! `edge` for the forge's outbound calls into the edge tier.

pub mod core;
pub mod data;
pub mod domain;
pub mod edge;
pub mod transport;
pub mod utils;
