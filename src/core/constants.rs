//! Named constants: environment variables, defaults, and on-wire limits.
//!
//! Centralized the way the teacher keeps every `ENV_*`/`DEFAULT_*` constant
//! in one file, so `core::cli` and `core::config` never hand-roll a string
//! literal for an environment variable name.

// =============================================================================
// Application identity
// =============================================================================

pub const APP_NAME: &str = "SmartPiXL Forge";
pub const APP_NAME_LOWER: &str = "forge";

// =============================================================================
// Environment variables — config/logging
// =============================================================================

pub const ENV_CONFIG: &str = "FORGE_CONFIG";
pub const ENV_LOG: &str = "FORGE_LOG";

// =============================================================================
// Environment variables — transport
// =============================================================================

pub const ENV_PIPE_NAME: &str = "FORGE_PIPE_NAME";
pub const ENV_FAILOVER_DIR: &str = "FORGE_FAILOVER_DIR";
pub const ENV_PIPE_CHANNEL_CAPACITY: &str = "FORGE_PIPE_CHANNEL_CAPACITY";
pub const ENV_WRITER_CHANNEL_CAPACITY: &str = "FORGE_SQL_WRITER_CHANNEL_CAPACITY";
pub const ENV_MAX_PIPE_INSTANCES: &str = "FORGE_MAX_CONCURRENT_PIPE_INSTANCES";
pub const ENV_FAILOVER_SCAN_INTERVAL_SECS: &str = "FORGE_FAILOVER_SCAN_INTERVAL_SECONDS";

// =============================================================================
// Environment variables — enrichment
// =============================================================================

pub const ENV_ENABLE_ENRICHMENTS: &str = "FORGE_ENABLE_ENRICHMENTS";
pub const ENV_GEO_CITY_DB: &str = "FORGE_GEOIP_CITY_DB";
pub const ENV_GEO_ASN_DB: &str = "FORGE_GEOIP_ASN_DB";
pub const ENV_GEO_COUNTRY_DB: &str = "FORGE_GEOIP_COUNTRY_DB";
pub const ENV_GEO_API_URL: &str = "FORGE_GEO_API_URL";
pub const ENV_GEO_API_KEY: &str = "FORGE_GEO_API_KEY";

// =============================================================================
// Environment variables — writer / database
// =============================================================================

pub const ENV_DATABASE_URL: &str = "FORGE_DATABASE_URL";
pub const ENV_BATCH_SIZE: &str = "FORGE_BATCH_SIZE";
pub const ENV_BATCH_FLUSH_MS: &str = "FORGE_BATCH_FLUSH_MILLISECONDS";
pub const ENV_BULK_COPY_TIMEOUT_SECS: &str = "FORGE_BULK_COPY_TIMEOUT_SECONDS";
pub const ENV_SHUTDOWN_TIMEOUT_SECS: &str = "FORGE_SHUTDOWN_TIMEOUT_SECONDS";
pub const ENV_DEAD_LETTER_DIR: &str = "FORGE_DEAD_LETTER_DIR";

// =============================================================================
// Environment variables — ETL / maintenance
// =============================================================================

pub const ENV_ETL_INTERVAL_SECS: &str = "FORGE_ETL_INTERVAL_SECONDS";
pub const ENV_PURGE_HOUR_UTC: &str = "FORGE_PURGE_HOUR_UTC";
pub const ENV_INDEX_MAINTENANCE_HOUR_UTC: &str = "FORGE_INDEX_MAINTENANCE_HOUR_UTC";

// =============================================================================
// Environment variables — edge health
// =============================================================================

pub const ENV_EDGE_BASE_URL: &str = "FORGE_EDGE_BASE_URL";

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_PIPE_NAME: &str = "SmartPiXL-Enrichment";
pub const DEFAULT_PIPE_CHANNEL_CAPACITY: usize = 50_000;
pub const DEFAULT_WRITER_CHANNEL_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_PIPE_INSTANCES: usize = 4;
pub const DEFAULT_FAILOVER_SCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// `T` in spec.md §4.6 ("buffers up to B records or until T ms elapses,
/// whichever is first") — the spec names the existence of the timer but
/// not its value, so this is an Open Question decision (see DESIGN.md).
pub const DEFAULT_BATCH_FLUSH_MS: u64 = 500;
pub const DEFAULT_BULK_COPY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ETL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_PURGE_HOUR_UTC: u8 = 3;
pub const DEFAULT_INDEX_MAINTENANCE_HOUR_UTC: u8 = 4;
pub const DEFAULT_EDGE_BASE_URL: &str = "http://127.0.0.1:6000";

// =============================================================================
// On-wire / protocol limits (spec.md §4.1, §9)
// =============================================================================

/// Maximum size of a single NDJSON line accepted from the edge (§4.1).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Maximum length of raw `UserAgent`/`Referer` header values (§3.1).
pub const MAX_HEADER_FIELD_CHARS: usize = 2_000;

/// Hard cap on `QueryString` growth (spec.md §9 Open Question).
pub const QUERY_STRING_HARD_CAP_BYTES: usize = 32 * 1024;

// =============================================================================
// Session stitching (§4.5.1)
// =============================================================================

pub const SESSION_TIMEOUT_SECS: i64 = 30 * 60;
pub const SESSION_EVICTION_INTERVAL_SECS: u64 = 120;

// =============================================================================
// Cross-customer intel (§4.5.2)
// =============================================================================

pub const CROSS_CUSTOMER_WINDOW_SECS: i64 = 2 * 60 * 60;
pub const CROSS_CUSTOMER_ALERT_WINDOW_SECS: i64 = 5 * 60;
pub const CROSS_CUSTOMER_ALERT_THRESHOLD: usize = 3;
pub const CROSS_CUSTOMER_EVICTION_INTERVAL_SECS: u64 = 5 * 60;

// =============================================================================
// Dead-internet index (§4.5.7)
// =============================================================================

pub const DEAD_INTERNET_WINDOW_HOURS: i64 = 24;
pub const DEAD_INTERNET_MIN_HITS_FOR_INDEX: u64 = 5;
pub const DEAD_INTERNET_EVICTION_INTERVAL_SECS: u64 = 10 * 60;
pub const DEAD_INTERNET_IDLE_EVICTION_HOURS: i64 = 48;

// =============================================================================
// Behavioral replay (§4.5.6)
// =============================================================================

pub const REPLAY_LRU_CAPACITY: usize = 100_000;
pub const REPLAY_SPATIAL_GRID_PX: i64 = 10;
pub const REPLAY_TEMPORAL_BUCKET_MS: i64 = 100;

// =============================================================================
// External geo API (§4.4.5)
// =============================================================================

pub const GEO_API_KNOWN_IP_TTL_DAYS: i64 = 90;
pub const GEO_API_MIN_INTERVAL_MS: u64 = 2_100;

// =============================================================================
// Circuit breaker (§4.6)
// =============================================================================

pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 3;
pub const CIRCUIT_FAILURE_WINDOW_SECS: i64 = 60;
pub const CIRCUIT_OPEN_COOLDOWN_SECS: u64 = 30;

// =============================================================================
// ETL deadlock retry (§4.7)
// =============================================================================

pub const ETL_DEADLOCK_MAX_ATTEMPTS: u32 = 3;
pub const ETL_DEADLOCK_BASE_DELAY_MS: u64 = 500;
pub const ETL_DEADLOCK_JITTER_FRACTION: f64 = 0.25;

/// Postgres SQLSTATE for deadlock_detected (see DESIGN.md Open Question #2).
pub const POSTGRES_DEADLOCK_SQLSTATE: &str = "40P01";

// =============================================================================
// Maintenance (§4.7)
// =============================================================================

pub const MAINTENANCE_PURGE_RETENTION_DAYS: i64 = 90;
pub const MAINTENANCE_PURGE_CHUNK_ROWS: i64 = 10_000;
pub const MAINTENANCE_PURGE_PAUSE_SECS: u64 = 1;

// =============================================================================
// Edge health (§4.8)
// =============================================================================

pub const EDGE_HEALTH_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Transport overflow policy (§4.1, §4.2)
// =============================================================================

/// How long A/B block on a full `ChanEnrichment` before dropping the record.
pub const CHANNEL_OVERFLOW_BLOCK_MS: u64 = 100;

// =============================================================================
// Enrichment pipeline (§4.3, §5)
// =============================================================================

/// How long the pipeline drains `ChanEnrichment` on shutdown before
/// abandoning whatever remains queued.
pub const PIPELINE_SHUTDOWN_DRAIN_SECS: u64 = 5;
