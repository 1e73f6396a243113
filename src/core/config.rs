//! Layered application configuration.
//!
//! Precedence, low to high: built-in defaults -> config file (JSON) ->
//! environment variables -> CLI flags. Mirrors the teacher's
//! `core/config.rs` + `core/cli.rs` split: small `Copy` enums with a
//! `Display` impl, a flat `AppConfig` tree deserialized with `serde`, and a
//! `CliConfig` that only carries `Option<T>` overrides.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub pipe_name: String,
    pub failover_directory: PathBuf,
    pub pipe_channel_capacity: usize,
    pub sql_writer_channel_capacity: usize,
    pub max_concurrent_pipe_instances: usize,
    pub failover_scan_interval_seconds: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pipe_name: DEFAULT_PIPE_NAME.to_string(),
            failover_directory: PathBuf::from("failover"),
            pipe_channel_capacity: DEFAULT_PIPE_CHANNEL_CAPACITY,
            sql_writer_channel_capacity: DEFAULT_WRITER_CHANNEL_CAPACITY,
            max_concurrent_pipe_instances: DEFAULT_MAX_PIPE_INSTANCES,
            failover_scan_interval_seconds: DEFAULT_FAILOVER_SCAN_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    /// Path to a MaxMind-style City `.mmdb` file. Absent is a graceful no-op (spec.md §9).
    pub geoip_city_db: Option<PathBuf>,
    pub geoip_asn_db: Option<PathBuf>,
    pub geoip_country_db: Option<PathBuf>,
    pub geo_api_url: Option<String>,
    pub geo_api_key: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            geoip_city_db: None,
            geoip_asn_db: None,
            geoip_country_db: None,
            geo_api_url: None,
            geo_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub database_url: String,
    pub batch_size: usize,
    pub batch_flush_ms: u64,
    pub bulk_copy_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,
    pub dead_letter_directory: PathBuf,
    pub pool_max_connections: u32,
    pub pool_min_connections: u32,
    pub pool_acquire_timeout_seconds: u64,
    pub pool_idle_timeout_seconds: u64,
    pub pool_max_lifetime_seconds: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/smartpixl".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_flush_ms: DEFAULT_BATCH_FLUSH_MS,
            bulk_copy_timeout_seconds: DEFAULT_BULK_COPY_TIMEOUT_SECS,
            shutdown_timeout_seconds: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            dead_letter_directory: PathBuf::from("dead-letter"),
            pool_max_connections: POSTGRES_DEFAULT_MAX_CONNECTIONS,
            pool_min_connections: POSTGRES_DEFAULT_MIN_CONNECTIONS,
            pool_acquire_timeout_seconds: POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
            pool_idle_timeout_seconds: POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
            pool_max_lifetime_seconds: POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
        }
    }
}

const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;
const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;
const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub interval_seconds: u64,
    pub purge_hour_utc: u8,
    pub index_maintenance_hour_utc: u8,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_ETL_INTERVAL_SECS,
            purge_hour_utc: DEFAULT_PURGE_HOUR_UTC,
            index_maintenance_hour_utc: DEFAULT_INDEX_MAINTENANCE_HOUR_UTC,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub base_url: String,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EDGE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub enrichment: EnrichmentConfig,
    pub writer: WriterConfig,
    pub etl: EtlConfig,
    pub edge: EdgeConfig,
}

/// Configuration error: scope is always startup, action is always fatal
/// (spec.md §7 `ConfigError`).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AppConfig {
    /// Load defaults, overlay an optional config file, then environment
    /// variables, then CLI flags. Any failure here is fatal at startup.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let mut config = AppConfig::default();

        if let Some(path) = cli.config.clone().or_else(default_config_path) {
            if path.exists() {
                config = Self::load_file(&path)
                    .with_context(|| format!("loading config file {}", path.display()))?;
            }
        }

        config.apply_env();
        config.apply_cli(cli);
        config.validate()?;

        Ok(config)
    }

    fn load_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(ENV_PIPE_NAME) {
            self.transport.pipe_name = v;
        }
        if let Ok(v) = std::env::var(ENV_FAILOVER_DIR) {
            self.transport.failover_directory = PathBuf::from(v);
        }
        apply_env_parsed(ENV_PIPE_CHANNEL_CAPACITY, &mut self.transport.pipe_channel_capacity);
        apply_env_parsed(
            ENV_WRITER_CHANNEL_CAPACITY,
            &mut self.transport.sql_writer_channel_capacity,
        );
        apply_env_parsed(
            ENV_MAX_PIPE_INSTANCES,
            &mut self.transport.max_concurrent_pipe_instances,
        );
        apply_env_parsed(
            ENV_FAILOVER_SCAN_INTERVAL_SECS,
            &mut self.transport.failover_scan_interval_seconds,
        );

        if let Ok(v) = std::env::var(ENV_ENABLE_ENRICHMENTS) {
            self.enrichment.enabled = parse_bool(&v, self.enrichment.enabled);
        }
        if let Ok(v) = std::env::var(ENV_GEO_CITY_DB) {
            self.enrichment.geoip_city_db = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var(ENV_GEO_ASN_DB) {
            self.enrichment.geoip_asn_db = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var(ENV_GEO_COUNTRY_DB) {
            self.enrichment.geoip_country_db = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var(ENV_GEO_API_URL) {
            self.enrichment.geo_api_url = Some(v);
        }
        if let Ok(v) = std::env::var(ENV_GEO_API_KEY) {
            self.enrichment.geo_api_key = Some(v);
        }

        if let Ok(v) = std::env::var(ENV_DATABASE_URL) {
            self.writer.database_url = v;
        }
        apply_env_parsed(ENV_BATCH_SIZE, &mut self.writer.batch_size);
        apply_env_parsed(ENV_BATCH_FLUSH_MS, &mut self.writer.batch_flush_ms);
        apply_env_parsed(
            ENV_BULK_COPY_TIMEOUT_SECS,
            &mut self.writer.bulk_copy_timeout_seconds,
        );
        apply_env_parsed(
            ENV_SHUTDOWN_TIMEOUT_SECS,
            &mut self.writer.shutdown_timeout_seconds,
        );
        if let Ok(v) = std::env::var(ENV_DEAD_LETTER_DIR) {
            self.writer.dead_letter_directory = PathBuf::from(v);
        }

        apply_env_parsed(ENV_ETL_INTERVAL_SECS, &mut self.etl.interval_seconds);
        apply_env_parsed(ENV_PURGE_HOUR_UTC, &mut self.etl.purge_hour_utc);
        apply_env_parsed(
            ENV_INDEX_MAINTENANCE_HOUR_UTC,
            &mut self.etl.index_maintenance_hour_utc,
        );

        if let Ok(v) = std::env::var(ENV_EDGE_BASE_URL) {
            self.edge.base_url = v;
        }
    }

    fn apply_cli(&mut self, cli: &CliConfig) {
        if let Some(v) = &cli.pipe_name {
            self.transport.pipe_name = v.clone();
        }
        if let Some(v) = &cli.failover_dir {
            self.transport.failover_directory = v.clone();
        }
        if let Some(v) = cli.enable_enrichments {
            self.enrichment.enabled = v;
        }
        if let Some(v) = &cli.database_url {
            self.writer.database_url = v.clone();
        }
        if let Some(v) = &cli.edge_base_url {
            self.edge.base_url = v.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.pipe_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.pipe_channel_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.transport.sql_writer_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.sql_writer_channel_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.etl.purge_hour_utc > 23 {
            return Err(ConfigError::Invalid {
                field: "etl.purge_hour_utc",
                reason: "must be 0-23".to_string(),
            });
        }
        if self.etl.index_maintenance_hour_utc > 23 {
            return Err(ConfigError::Invalid {
                field: "etl.index_maintenance_hour_utc",
                reason: "must be 0-23".to_string(),
            });
        }
        if self.writer.database_url.is_empty() {
            return Err(ConfigError::Invalid {
                field: "writer.database_url",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var(ENV_CONFIG).ok().map(PathBuf::from)
}

fn apply_env_parsed<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(key) {
        if let Ok(parsed) = v.parse() {
            *slot = parsed;
        } else {
            tracing::warn!(key, value = %v, "ignoring unparsable environment override");
        }
    }
}

fn parse_bool(v: &str, fallback: bool) -> bool {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipe={} enrichments={} etl_interval={}s",
            self.transport.pipe_name, self.enrichment.enabled, self.etl.interval_seconds
        )
    }
}
