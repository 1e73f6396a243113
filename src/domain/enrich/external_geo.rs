//! Step 5 — External geo API (spec §4.4.5): rate-limited, conditional on a
//! known-IP cache. Skipped entirely if the IP was looked up less than 90
//! days ago. The known-IP map is seeded from the relational `IpApiCache`
//! table at startup (streamed incrementally — spec §9 "Known-IP cache at
//! startup" — the production table is ~300M rows).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use nonzero_ext::nonzero;
use sqlx::PgPool;

use crate::core::constants::GEO_API_KNOWN_IP_TTL_DAYS;

#[derive(Debug, Clone, Default)]
pub struct ExternalGeoResult {
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
}

type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Maintains the `{IP -> LastSeen}` freshness map and a global token bucket
/// limiting calls to ~28.5/min (spec: "minimum inter-call delay of 2100ms").
pub struct ExternalGeoService {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    known_ips: DashMap<String, DateTime<Utc>>,
    limiter: Arc<GlobalLimiter>,
}

impl ExternalGeoService {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builder with static config never fails");

        // Quota::with_period takes the minimum interval between permits;
        // 2100ms yields ~28.5 requests/min, matching the spec exactly.
        let quota = Quota::with_period(Duration::from_millis(2_100))
            .unwrap_or_else(|| Quota::per_minute(nonzero!(28u32)));

        Self {
            client,
            base_url,
            api_key,
            known_ips: DashMap::new(),
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Stream the seed set from `IpApiCache` incrementally so a ~300M row
    /// table doesn't spike memory all at once (spec §9). Startup may take
    /// tens of seconds; progress is logged, not hidden.
    pub async fn load_known_ips(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        use futures::TryStreamExt;

        let mut rows =
            sqlx::query_as::<_, (String, DateTime<Utc>)>("SELECT ip_address, last_seen FROM ip_api_cache")
                .fetch(pool);

        let mut loaded: u64 = 0;
        while let Some((ip, last_seen)) = rows.try_next().await? {
            self.known_ips.insert(ip, last_seen);
            loaded += 1;
            if loaded % 1_000_000 == 0 {
                tracing::info!(loaded, "external geo known-IP cache still loading");
            }
        }
        tracing::info!(loaded, "external geo known-IP cache loaded");
        Ok(())
    }

    pub fn is_fresh(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.known_ips
            .get(ip)
            .map(|last_seen| now - *last_seen < chrono::Duration::days(GEO_API_KNOWN_IP_TTL_DAYS))
            .unwrap_or(false)
    }

    /// Call the external API, honoring the rate limiter, then upsert the
    /// result into `IpApiCache` (MERGE by IP, preferring non-null fields)
    /// and refresh the in-memory freshness map.
    pub async fn lookup(
        &self,
        pool: &PgPool,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Option<ExternalGeoResult> {
        let (Some(base_url), Some(_)) = (&self.base_url, &self.api_key) else {
            return None;
        };

        self.limiter.until_ready().await;

        let url = format!("{base_url}/{ip}");
        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(ip, error = %err, "external geo API request failed");
                return None;
            }
        };

        let result: ExternalGeoResult = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(ip, error = %err, "external geo API returned unparseable body");
                return None;
            }
        };

        if let Err(err) = self.upsert(pool, ip, &result, now).await {
            tracing::warn!(ip, error = %err, "failed to persist external geo result");
        }
        self.known_ips.insert(ip.to_string(), now);

        Some(result)
    }

    async fn upsert(
        &self,
        pool: &PgPool,
        ip: &str,
        result: &ExternalGeoResult,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO ip_api_cache (ip_address, country_code, region, city, isp, last_seen) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (ip_address) DO UPDATE SET \
               country_code = COALESCE(EXCLUDED.country_code, ip_api_cache.country_code), \
               region = COALESCE(EXCLUDED.region, ip_api_cache.region), \
               city = COALESCE(EXCLUDED.city, ip_api_cache.city), \
               isp = COALESCE(EXCLUDED.isp, ip_api_cache.isp), \
               last_seen = EXCLUDED.last_seen",
        )
        .bind(ip)
        .bind(&result.country_code)
        .bind(&result.region)
        .bind(&result.city)
        .bind(&result.isp)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }
}

impl<'de> serde::Deserialize<'de> for ExternalGeoResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Wire {
            #[serde(default, rename = "countryCode")]
            country_code: Option<String>,
            #[serde(default)]
            region: Option<String>,
            #[serde(default)]
            city: Option<String>,
            #[serde(default)]
            isp: Option<String>,
        }
        let wire = Wire::deserialize(deserializer)?;
        Ok(ExternalGeoResult {
            country_code: wire.country_code,
            region: wire.region,
            city: wire.city,
            isp: wire.isp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_service_has_no_fresh_entries() {
        let service = ExternalGeoService::new(None, None);
        assert!(!service.is_fresh("8.8.8.8", Utc::now()));
    }

    #[test]
    fn freshness_respects_the_ttl_window() {
        let service = ExternalGeoService::new(None, None);
        let now = Utc::now();
        service.known_ips.insert("8.8.8.8".to_string(), now - chrono::Duration::days(10));
        assert!(service.is_fresh("8.8.8.8", now));

        service
            .known_ips
            .insert("1.1.1.1".to_string(), now - chrono::Duration::days(120));
        assert!(!service.is_fresh("1.1.1.1", now));
    }
}
