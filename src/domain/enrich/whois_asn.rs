//! Step 6 — WHOIS ASN (spec §4.4.6): plain-text WHOIS protocol, 5s timeout,
//! line-based field extraction. Conditional — the pipeline skips this step
//! entirely when offline geo (step 4) already returned a non-empty ASN.

use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const WHOIS_HOST: &str = "whois.radb.net";
const WHOIS_PORT: u16 = 43;
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct WhoisAsnResult {
    pub asn: Option<u32>,
    pub org: Option<String>,
}

pub struct WhoisAsnResolver;

impl WhoisAsnResolver {
    pub fn new() -> Self {
        Self
    }

    pub async fn lookup(&self, ip: &str) -> WhoisAsnResult {
        if ip.parse::<IpAddr>().is_err() {
            return WhoisAsnResult::default();
        }

        match tokio::time::timeout(TIMEOUT, query(ip)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::debug!(ip, error = %err, "whois lookup failed");
                WhoisAsnResult::default()
            }
            Err(_) => {
                tracing::debug!(ip, "whois lookup timed out");
                WhoisAsnResult::default()
            }
        }
    }
}

impl Default for WhoisAsnResolver {
    fn default() -> Self {
        Self::new()
    }
}

async fn query(ip: &str) -> std::io::Result<WhoisAsnResult> {
    let mut stream = TcpStream::connect((WHOIS_HOST, WHOIS_PORT)).await?;
    stream.write_all(format!("{ip}\r\n").as_bytes()).await?;
    stream.shutdown().await.ok();

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;

    Ok(parse_response(&response))
}

/// WHOIS responses are loosely-structured `key: value` lines; field names
/// vary by registry (`origin`, `OriginAS`, `aut-num`) so this checks a small
/// table of known spellings.
fn parse_response(body: &str) -> WhoisAsnResult {
    let mut result = WhoisAsnResult::default();

    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "origin" | "originas" | "aut-num" if result.asn.is_none() => {
                result.asn = parse_asn(value);
            }
            "org-name" | "orgname" | "descr" if result.org.is_none() => {
                result.org = Some(value.to_string());
            }
            _ => {}
        }
    }

    result
}

fn parse_asn(value: &str) -> Option<u32> {
    value
        .trim_start_matches(|c: char| c.is_alphabetic())
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_as_field() {
        let body = "route: 8.8.8.0/24\norigin: AS15169\ndescr: Google LLC\n";
        let result = parse_response(body);
        assert_eq!(result.asn, Some(15169));
        assert_eq!(result.org, Some("Google LLC".to_string()));
    }

    #[test]
    fn unparseable_asn_field_is_ignored() {
        let body = "origin: not-an-asn\n";
        let result = parse_response(body);
        assert!(result.asn.is_none());
    }

    #[test]
    fn empty_body_yields_empty_result() {
        let result = parse_response("");
        assert!(result.asn.is_none());
        assert!(result.org.is_none());
    }
}
