//! Step 4 — Offline geo (spec §4.4.4): memory-mapped MaxMind-style `.mmdb`
//! lookups for City, ASN, and Country databases. Any of the three files may
//! be absent; a missing database is a no-op, not a startup error
//! (spec §9 "Graceful degradation").

use std::net::IpAddr;
use std::path::Path;

use maxminddb::{Reader, geoip2};

#[derive(Debug, Clone, Default)]
pub struct OfflineGeoResult {
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub asn: Option<u32>,
    pub asn_org: Option<String>,
}

impl OfflineGeoResult {
    pub fn has_asn(&self) -> bool {
        self.asn.is_some()
    }
}

/// Holds whichever of the three `.mmdb` readers were successfully opened at
/// startup. Readers are memory-mapped and safe to share read-only across
/// every enrichment worker (spec §5 "Offline geo databases: memory-mapped,
/// shared read-only across all threads").
pub struct OfflineGeoService {
    city: Option<Reader<Vec<u8>>>,
    asn: Option<Reader<Vec<u8>>>,
    country: Option<Reader<Vec<u8>>>,
}

impl OfflineGeoService {
    pub fn open(
        city_path: Option<&Path>,
        asn_path: Option<&Path>,
        country_path: Option<&Path>,
    ) -> Self {
        Self {
            city: city_path.and_then(|p| open_one(p, "City")),
            asn: asn_path.and_then(|p| open_one(p, "ASN")),
            country: country_path.and_then(|p| open_one(p, "Country")),
        }
    }

    pub fn lookup(&self, ip: &str) -> OfflineGeoResult {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return OfflineGeoResult::default();
        };

        let mut result = self.lookup_city(addr);
        if result.country_code.is_none() {
            self.fill_from_country(addr, &mut result);
        }
        self.fill_asn(addr, &mut result);
        result
    }

    fn lookup_city(&self, addr: IpAddr) -> OfflineGeoResult {
        let Some(reader) = &self.city else {
            return OfflineGeoResult::default();
        };
        let Ok(city) = reader.lookup::<geoip2::City>(addr) else {
            return OfflineGeoResult::default();
        };
        let Some(city) = city else {
            return OfflineGeoResult::default();
        };

        let country_code = city
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(str::to_string);
        let region = city
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|sub| sub.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let city_name = city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let (latitude, longitude) = city
            .location
            .as_ref()
            .map(|loc| (loc.latitude, loc.longitude))
            .unwrap_or((None, None));

        OfflineGeoResult {
            country_code,
            region,
            city: city_name,
            latitude,
            longitude,
            asn: None,
            asn_org: None,
        }
    }

    fn fill_from_country(&self, addr: IpAddr, result: &mut OfflineGeoResult) {
        let Some(reader) = &self.country else {
            return;
        };
        if let Ok(Some(country)) = reader.lookup::<geoip2::Country>(addr) {
            result.country_code = country
                .country
                .as_ref()
                .and_then(|c| c.iso_code)
                .map(str::to_string);
        }
    }

    fn fill_asn(&self, addr: IpAddr, result: &mut OfflineGeoResult) {
        let Some(reader) = &self.asn else {
            return;
        };
        if let Ok(Some(asn)) = reader.lookup::<geoip2::Asn>(addr) {
            result.asn = asn.autonomous_system_number;
            result.asn_org = asn.autonomous_system_organization.map(str::to_string);
        }
    }
}

fn open_one(path: &Path, kind: &str) -> Option<Reader<Vec<u8>>> {
    match Reader::open_readfile(path) {
        Ok(reader) => {
            tracing::info!(kind, path = %path.display(), "opened offline geo database");
            Some(reader)
        }
        Err(err) => {
            tracing::warn!(kind, path = %path.display(), error = %err, "offline geo database unavailable, continuing without it");
            None
        }
    }
}

impl Default for OfflineGeoService {
    fn default() -> Self {
        Self {
            city: None,
            asn: None,
            country: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_databases_are_a_graceful_no_op() {
        let service = OfflineGeoService::default();
        let result = service.lookup("8.8.8.8");
        assert!(result.country_code.is_none());
        assert!(!result.has_asn());
    }

    #[test]
    fn unparseable_ip_yields_empty_result() {
        let service = OfflineGeoService::default();
        let result = service.lookup("not-an-ip");
        assert!(result.country_code.is_none());
    }
}
