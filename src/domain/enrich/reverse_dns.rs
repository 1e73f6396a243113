//! Step 3 — Reverse DNS (spec §4.4.3): PTR lookup with a 2 s total timeout,
//! then a cloud-hostname pattern match. Timeout or lookup failure yields an
//! empty result; this step never escalates.

use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use regex::Regex;

const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct ReverseDnsResult {
    pub hostname: Option<String>,
    pub is_cloud: bool,
    pub cloud_provider: Option<&'static str>,
}

pub struct ReverseDnsResolver {
    resolver: TokioAsyncResolver,
    cloud_patterns: Vec<(Regex, &'static str)>,
}

impl ReverseDnsResolver {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let table: &[(&str, &str)] = &[
            (r"(?i)\.amazonaws\.com$", "AWS"),
            (r"(?i)\.compute\.internal$", "AWS"),
            (r"(?i)\.googleusercontent\.com$", "GCP"),
            (r"(?i)\.cloud\.google\.com$", "GCP"),
            (r"(?i)\.azure\.com$", "Azure"),
            (r"(?i)\.cloudapp\.azure\.com$", "Azure"),
            (r"(?i)\.digitalocean\.com$", "DigitalOcean"),
            (r"(?i)\.akamai(technologies)?\.com$", "Akamai"),
            (r"(?i)\.akamaiedge\.net$", "Akamai"),
            (r"(?i)\.cloudflare\.com$", "Cloudflare"),
            (r"(?i)\.hetzner\.(com|de)$", "Hetzner"),
            (r"(?i)\.ovh\.(com|net)$", "OVH"),
            (r"(?i)\.scaleway\.com$", "Scaleway"),
        ];
        let cloud_patterns = table
            .iter()
            .map(|(pattern, name)| (Regex::new(pattern).expect("static cloud hostname pattern is valid"), *name))
            .collect();
        Self { resolver, cloud_patterns }
    }

    pub async fn lookup(&self, ip: &str) -> ReverseDnsResult {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return ReverseDnsResult::default();
        };

        match tokio::time::timeout(TIMEOUT, self.resolver.reverse_lookup(addr)).await {
            Ok(Ok(response)) => match response.iter().next() {
                Some(name) => {
                    let hostname = name.to_string().trim_end_matches('.').to_string();
                    let (is_cloud, cloud_provider) = self.match_cloud(&hostname);
                    ReverseDnsResult {
                        hostname: Some(hostname),
                        is_cloud,
                        cloud_provider,
                    }
                }
                None => ReverseDnsResult::default(),
            },
            Ok(Err(err)) => {
                tracing::debug!(ip, error = %err, "reverse dns lookup failed");
                ReverseDnsResult::default()
            }
            Err(_) => {
                tracing::debug!(ip, "reverse dns lookup timed out");
                ReverseDnsResult::default()
            }
        }
    }

    fn match_cloud(&self, hostname: &str) -> (bool, Option<&'static str>) {
        for (pattern, provider) in &self.cloud_patterns {
            if pattern.is_match(hostname) {
                return (true, Some(provider));
            }
        }
        (false, None)
    }
}

impl Default for ReverseDnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_cloud_hostname() {
        let resolver = ReverseDnsResolver::new();
        let (is_cloud, provider) = resolver.match_cloud("ec2-1-2-3-4.compute-1.amazonaws.com");
        assert!(is_cloud);
        assert_eq!(provider, Some("AWS"));
    }

    #[test]
    fn residential_hostname_is_not_cloud() {
        let resolver = ReverseDnsResolver::new();
        let (is_cloud, _) = resolver.match_cloud("c-73-12-34-56.hsd1.ca.comcast.net");
        assert!(!is_cloud);
    }

    #[tokio::test]
    async fn unparseable_ip_yields_empty_result() {
        let resolver = ReverseDnsResolver::new();
        let result = resolver.lookup("not-an-ip").await;
        assert!(result.hostname.is_none());
        assert!(!result.is_cloud);
    }
}
