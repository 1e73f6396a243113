//! The relational store glue (spec §6.4): one Postgres pool shared by the
//! bulk writer's raw-table insert, the external geo API's `IpApiCache`
//! MERGE (owned by `domain::enrich::external_geo`, which borrows this
//! pool), the ETL scheduler's four stored-procedure RPCs, and the
//! maintenance scheduler's purge/index-maintenance/remediation-log work.
//!
//! Schema ownership is split the way spec §1 draws the line: the *wide
//! parsed tables* and the four stored procedures are owned by ETL, fully
//! external to this process. The raw capture table, the remediation log,
//! and the watermark table are the forge's own write surface, so — mirroring
//! the teacher's `data::postgres::migrations` idiom — this module applies
//! an idempotent `CREATE TABLE IF NOT EXISTS` schema for exactly those on
//! connect, rather than assuming an operator staged them by hand.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::core::config::WriterConfig;
use crate::domain::record::TrackingRecord;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_hits (
    id              BIGSERIAL PRIMARY KEY,
    company_id      TEXT NOT NULL,
    pixel_id        TEXT NOT NULL,
    ip_address      TEXT NOT NULL,
    user_agent      TEXT NOT NULL,
    referer         TEXT NOT NULL,
    query_string    TEXT NOT NULL,
    request_path    TEXT NOT NULL,
    headers_json    TEXT NOT NULL,
    received_at     TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS ip_api_cache (
    ip_address      TEXT PRIMARY KEY,
    country_code    TEXT,
    region          TEXT,
    city            TEXT,
    isp             TEXT,
    last_seen       TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS etl_watermarks (
    process_name    TEXT PRIMARY KEY,
    last_processed_id BIGINT NOT NULL DEFAULT 0,
    rows_processed  BIGINT NOT NULL DEFAULT 0,
    last_run_at     TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS remediation_log (
    id              BIGSERIAL PRIMARY KEY,
    action          TEXT NOT NULL,
    details         TEXT NOT NULL,
    rows_affected   BIGINT NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL
);
"#;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Result row returned by each of the four named stored procedures
/// (spec §4.7): "each returns rowcount metrics via the first result row."
/// Procedures are opaque RPCs to this process — the watermark columns are
/// read back only for the tick's log line, never written by the scheduler
/// (spec §4.7 watermark contract: "the scheduler does not itself touch
/// watermarks").
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcResult {
    pub rows_processed: i64,
    pub last_processed_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Watermark {
    pub process_name: String,
    pub last_processed_id: i64,
    pub rows_processed: i64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Owns the Postgres pool and the forge's own tables. Cheap to clone
/// (wraps `PgPool`, itself an `Arc` internally).
#[derive(Clone)]
pub struct RelationalStore {
    pool: PgPool,
}

impl RelationalStore {
    pub async fn connect(config: &WriterConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_connections)
            .min_connections(config.pool_min_connections)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.pool_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.pool_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        tracing::debug!(
            max_connections = config.pool_max_connections,
            min_connections = config.pool_min_connections,
            "relational store connected and schema ensured"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bulk-insert a batch into the raw capture table (spec §4.6's nine
    /// columns), one multi-row `INSERT` built with `QueryBuilder` rather
    /// than N round trips.
    pub async fn insert_raw_batch(&self, records: &[TrackingRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut qb: sqlx::QueryBuilder<'_, sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO raw_hits \
             (company_id, pixel_id, ip_address, user_agent, referer, query_string, request_path, headers_json, received_at) ",
        );
        qb.push_values(records, |mut b, record| {
            b.push_bind(&record.company_id)
                .push_bind(&record.pixel_id)
                .push_bind(&record.ip_address)
                .push_bind(&record.user_agent)
                .push_bind(&record.referer)
                .push_bind(record.query_string.as_str())
                .push_bind(&record.request_path)
                .push_bind(&record.headers_json)
                .push_bind(record.received_at);
        });

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Invoke one of the four named stored procedures in the ETL cadence
    /// (spec §4.7). Each is modeled as a set-returning function so the
    /// first row carries the rowcount/watermark metrics the spec promises.
    pub async fn call_etl_procedure(&self, procedure_name: &str) -> Result<ProcResult, sqlx::Error> {
        let sql = format!("SELECT * FROM {procedure_name}()");
        sqlx::query_as::<_, ProcResult>(&sql).fetch_one(&self.pool).await
    }

    /// Read-only watermark lookup, for diagnostics/logging only — the
    /// scheduler never writes this table (spec §4.7).
    pub async fn get_watermark(&self, process_name: &str) -> Result<Option<Watermark>, StoreError> {
        let watermark = sqlx::query_as::<_, Watermark>(
            "SELECT process_name, last_processed_id, rows_processed, last_run_at \
             FROM etl_watermarks WHERE process_name = $1",
        )
        .bind(process_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(watermark)
    }

    /// Append one audit row to the remediation log (spec §4.7 maintenance:
    /// "All actions append audit rows to a remediation log").
    pub async fn append_remediation_entry(
        &self,
        action: &str,
        details: &str,
        rows_affected: i64,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO remediation_log (action, details, rows_affected, recorded_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(action)
        .bind(details)
        .bind(rows_affected)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Batch-delete rows older than `cutoff` from the raw table, chunked
    /// to `chunk_rows` per statement with a pause between chunks (spec
    /// §4.7 maintenance: "10,000-row chunks with 1 s pauses"). Returns the
    /// total rows deleted.
    pub async fn purge_raw_hits_older_than(
        &self,
        cutoff: DateTime<Utc>,
        chunk_rows: i64,
        pause: Duration,
    ) -> Result<i64, StoreError> {
        let mut total = 0i64;
        loop {
            let result = sqlx::query(
                "DELETE FROM raw_hits WHERE id IN ( \
                   SELECT id FROM raw_hits WHERE received_at < $1 LIMIT $2 \
                 )",
            )
            .bind(cutoff)
            .bind(chunk_rows)
            .execute(&self.pool)
            .await?;

            let deleted = result.rows_affected() as i64;
            total += deleted;
            if deleted < chunk_rows {
                break;
            }
            tokio::time::sleep(pause).await;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_result_decodes_from_row_shape() {
        // Smoke-checks the struct shape matches what `call_etl_procedure`
        // expects back; actual DB round-trips are exercised against a real
        // Postgres instance in integration tests, not here.
        let result = ProcResult {
            rows_processed: 42,
            last_processed_id: 9001,
        };
        assert_eq!(result.rows_processed, 42);
        assert_eq!(result.last_processed_id, 9001);
    }
}
