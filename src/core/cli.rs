//! Command-line flags.
//!
//! Every flag is `Option<T>` so an absent flag leaves the layered config
//! (defaults -> file -> env) untouched, mirroring the teacher's
//! `core/cli.rs`: the CLI is the highest-precedence, but thinnest, layer.

use std::path::PathBuf;

use clap::Parser;

use super::constants::*;

#[derive(Debug, Parser)]
#[command(name = APP_NAME_LOWER, version, about = "SmartPiXL Forge enrichment engine")]
pub struct CliConfig {
    /// Path to a JSON config file. Defaults to `FORGE_CONFIG` if unset.
    #[arg(long, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Name of the local transport pipe/socket.
    #[arg(long, env = ENV_PIPE_NAME)]
    pub pipe_name: Option<String>,

    /// Directory scanned for `failover_*.jsonl` spool files.
    #[arg(long, env = ENV_FAILOVER_DIR)]
    pub failover_dir: Option<PathBuf>,

    /// Enable/disable the enrichment pipeline's stateless/stateful enrichers
    /// (records still flow through to the writer unenriched when disabled).
    #[arg(long, env = ENV_ENABLE_ENRICHMENTS)]
    pub enable_enrichments: Option<bool>,

    /// Postgres connection string for the relational store.
    #[arg(long, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// Base URL of the edge's internal health/status endpoints.
    #[arg(long, env = ENV_EDGE_BASE_URL)]
    pub edge_base_url: Option<String>,
}
