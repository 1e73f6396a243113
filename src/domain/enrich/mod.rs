//! Stateless enrichment services (spec §4.4, Component D).
//!
//! Each submodule is a single-purpose service with no shared mutable state
//! across records — the opposite of `domain::stateful`, whose services each
//! own a per-key-locked map. `EnrichContext` bundles one instance of each
//! stateless service for the pipeline to hold for the process lifetime.

pub mod bot_ua;
pub mod device_affluence;
pub mod external_geo;
pub mod lead_quality;
pub mod offline_geo;
pub mod reverse_dns;
pub mod ua_parse;
pub mod whois_asn;

use bot_ua::BotUaDetector;
use device_affluence::DeviceAffluenceScorer;
use external_geo::ExternalGeoService;
use offline_geo::OfflineGeoService;
use reverse_dns::ReverseDnsResolver;
use ua_parse::UaParser;
use whois_asn::WhoisAsnResolver;

use crate::core::config::EnrichmentConfig;

/// Every stateless enrichment service, constructed once at startup and
/// shared read-only (or internally-synchronized) across every enrichment
/// worker.
pub struct EnrichContext {
    pub bot_ua: BotUaDetector,
    pub ua_parser: UaParser,
    pub reverse_dns: ReverseDnsResolver,
    pub offline_geo: OfflineGeoService,
    pub external_geo: ExternalGeoService,
    pub whois_asn: WhoisAsnResolver,
    pub affluence: DeviceAffluenceScorer,
}

impl EnrichContext {
    pub fn new(config: &EnrichmentConfig) -> Self {
        Self {
            bot_ua: BotUaDetector::new(),
            ua_parser: UaParser::new(None),
            reverse_dns: ReverseDnsResolver::new(),
            offline_geo: OfflineGeoService::open(
                config.geoip_city_db.as_deref(),
                config.geoip_asn_db.as_deref(),
                config.geoip_country_db.as_deref(),
            ),
            external_geo: ExternalGeoService::new(config.geo_api_url.clone(), config.geo_api_key.clone()),
            whois_asn: WhoisAsnResolver::new(),
            affluence: DeviceAffluenceScorer::new(),
        }
    }
}
