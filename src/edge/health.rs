//! Edge Health Client (spec §4.8, Component H): an HTTP bridge to the
//! edge's three internal endpoints. Every call has a 5s timeout and
//! degrades to a safe default on failure — this client never escalates an
//! error to its caller (spec: "failures return safe defaults ... and
//! never propagate").

use std::time::Duration;

use serde::Deserialize;

use crate::core::constants::EDGE_HEALTH_TIMEOUT_SECS;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EdgeHealth {
    pub circuit: String,
    pub last_trip_reason: Option<String>,
    pub queue_depth: u64,
    pub uptime_seconds: u64,
    pub is_reachable: bool,
}

impl Default for EdgeHealth {
    fn default() -> Self {
        Self {
            circuit: "unknown".to_string(),
            last_trip_reason: None,
            queue_depth: 0,
            uptime_seconds: 0,
            is_reachable: false,
        }
    }
}

pub struct EdgeHealthClient {
    client: reqwest::Client,
    base_url: String,
}

impl EdgeHealthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EDGE_HEALTH_TIMEOUT_SECS))
            .build()
            .expect("reqwest client builder with static config never fails");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `GET /internal/health`. Any transport or decode failure yields
    /// `EdgeHealth { is_reachable: false, .. }` rather than an error.
    pub async fn health(&self) -> EdgeHealth {
        let url = format!("{}/internal/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.json::<EdgeHealth>().await.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "edge health check failed, reporting unreachable");
                EdgeHealth::default()
            }
        }
    }

    /// `POST /internal/circuit-reset`. Returns `false` on any failure.
    pub async fn reset_circuit(&self) -> bool {
        let url = format!("{}/internal/circuit-reset", self.base_url);
        match self.client.post(&url).send().await {
            Ok(response) => response
                .json::<ResetResponse>()
                .await
                .map(|body| body.success)
                .unwrap_or(false),
            Err(err) => {
                tracing::warn!(error = %err, "edge circuit reset request failed");
                false
            }
        }
    }

    /// `POST /internal/geo-cache/clear`. Returns `true` only on a 2xx
    /// response (spec: `204 No Content` on success).
    pub async fn clear_geo_cache(&self) -> bool {
        let url = format!("{}/internal/geo-cache/clear", self.base_url);
        match self.client.post(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::warn!(error = %err, "edge geo-cache clear request failed");
                false
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResetResponse {
    success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_health_reports_unreachable() {
        let health = EdgeHealth::default();
        assert!(!health.is_reachable);
        assert_eq!(health.queue_depth, 0);
    }

    #[tokio::test]
    async fn health_check_against_unreachable_host_degrades_gracefully() {
        let client = EdgeHealthClient::new("http://127.0.0.1:1");
        let health = client.health().await;
        assert!(!health.is_reachable);
    }

    #[tokio::test]
    async fn circuit_reset_against_unreachable_host_returns_false() {
        let client = EdgeHealthClient::new("http://127.0.0.1:1");
        assert!(!client.reset_circuit().await);
    }
}
