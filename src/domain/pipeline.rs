//! Enrichment pipeline (spec §4.3, Component C): single-reader loop over
//! `ChanEnrichment` running the fixed 15-step chain, then non-blocking
//! enqueue onto `ChanWriter`. Modeled on the teacher's `TracePipeline`: a
//! `start(rx, tx, shutdown_rx) -> JoinHandle<()>` method with a `biased;`
//! shutdown branch and a drain phase, plus a free-standing `run_chain`
//! kept separate from the task loop for unit testing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::clock::Clock;
use crate::core::constants::PIPELINE_SHUTDOWN_DRAIN_SECS;
use crate::domain::enrich::EnrichContext;
use crate::domain::record::TrackingRecord;
use crate::domain::stateful::behavioral_replay::{ReplayOutcome, ReplaySample};
use crate::domain::stateful::dead_internet::HitSignals;
use crate::domain::stateful::{
    evaluate_contradictions, evaluate_geo_arbitrage, estimate_device_age, ContradictionInputs,
    GeoArbitrageInputs, StatefulContext,
};
use crate::domain::enrich::lead_quality::{self, LeadQualitySignals};

pub struct Pipeline {
    enrich: Arc<EnrichContext>,
    stateful: Arc<StatefulContext>,
    pool: Option<PgPool>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        enrich: Arc<EnrichContext>,
        stateful: Arc<StatefulContext>,
        pool: Option<PgPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            enrich,
            stateful,
            pool,
            clock,
        }
    }

    pub fn start(
        self,
        mut rx: mpsc::Receiver<TrackingRecord>,
        tx: mpsc::Sender<TrackingRecord>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut shutdown_requested = false;

            loop {
                if shutdown_requested {
                    match tokio::time::timeout(
                        Duration::from_secs(PIPELINE_SHUTDOWN_DRAIN_SECS),
                        rx.recv(),
                    )
                    .await
                    {
                        Ok(Some(mut record)) => {
                            self.process_one(&mut record).await;
                            if tx.try_send(record).is_err() {
                                tracing::warn!("ChanWriter full during drain, dropping record");
                            }
                            continue;
                        }
                        _ => break,
                    }
                }

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("enrichment pipeline received shutdown, draining");
                            shutdown_requested = true;
                        }
                        continue;
                    }
                    received = rx.recv() => {
                        let Some(mut record) = received else {
                            break;
                        };
                        let t_start = std::time::Instant::now();
                        self.process_one(&mut record).await;
                        tracing::debug!(elapsed_ms = t_start.elapsed().as_millis() as u64, "record enriched");

                        if tx.try_send(record).is_err() {
                            tracing::warn!("ChanWriter full, dropping enriched record");
                        }
                    }
                }
            }

            tracing::debug!("enrichment pipeline shutdown complete");
        })
    }

    async fn process_one(&self, record: &mut TrackingRecord) {
        let now = self.clock.now();
        run_chain(record, &self.enrich, &self.stateful, self.pool.as_ref(), now).await;
    }
}

/// Client-provided query-string keys this pipeline reads, copied out up
/// front as owned values. Captured once, before any `_srv_*` append, since
/// a step must never read a `_srv_*` value a later step will write (spec
/// §4.3 side-effects contract) — and because `QueryString::get` borrows
/// the same buffer later steps append to, holding those borrows across
/// the chain would fight the borrow checker for no benefit.
struct ClientSignals {
    fingerprint: String,
    gpu: Option<String>,
    cores: Option<u32>,
    memory_gb: Option<u32>,
    screen_width: Option<u32>,
    screen_height: Option<u32>,
    platform: Option<String>,
    mouse_path: Option<String>,
    has_touch_events: bool,
    has_keyboard_activity: bool,
    has_nonzero_scroll: bool,
    timezone: Option<String>,
    timezone_offset_minutes: Option<i32>,
    language: Option<String>,
    calendar: Option<String>,
    decimal_separator: Option<char>,
    group_separator: Option<char>,
    date_format_sample: Option<String>,
    relative_time_locale: Option<String>,
    fonts_consistent_with_region: Option<bool>,
    plugin_count: Option<u32>,
    color_depth: Option<u32>,
    os_version: Option<String>,
    browser_major: Option<u32>,
}

impl ClientSignals {
    fn parse(record: &TrackingRecord) -> Self {
        let qs = &record.query_string;
        Self {
            fingerprint: qs.get("fp").unwrap_or_default().to_string(),
            gpu: qs.get("gpu").map(str::to_string),
            cores: qs.get("cores").and_then(|v| v.parse().ok()),
            memory_gb: qs.get("mem").and_then(|v| v.parse().ok()),
            screen_width: qs.get("sw").and_then(|v| v.parse().ok()),
            screen_height: qs.get("sh").and_then(|v| v.parse().ok()),
            platform: qs.get("platform").map(str::to_string),
            mouse_path: qs.get("mousePath").map(str::to_string),
            has_touch_events: is_truthy(qs.get("touch")),
            has_keyboard_activity: is_truthy(qs.get("kbd")),
            has_nonzero_scroll: qs.get("scroll").and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) != 0,
            timezone: qs.get("tz").map(str::to_string),
            timezone_offset_minutes: qs.get("tzOffset").and_then(|v| v.parse().ok()),
            language: qs.get("lang").map(str::to_string),
            calendar: qs.get("cal").map(str::to_string),
            decimal_separator: qs.get("dec").and_then(|v| v.chars().next()),
            group_separator: qs.get("grp").and_then(|v| v.chars().next()),
            date_format_sample: qs.get("dateFmt").map(str::to_string),
            relative_time_locale: qs.get("relTime").map(str::to_string),
            fonts_consistent_with_region: qs.get("fontsMatch").map(|v| is_truthy(Some(v))),
            plugin_count: qs.get("plugins").and_then(|v| v.parse().ok()),
            color_depth: qs.get("depth").and_then(|v| v.parse().ok()),
            os_version: qs.get("osVer").map(str::to_string),
            browser_major: qs.get("browserMajor").and_then(|v| v.parse().ok()),
        }
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

fn parse_mouse_path(raw: &str) -> Vec<ReplaySample> {
    raw.split(';')
        .filter_map(|triple| {
            let mut parts = triple.splitn(3, ',');
            let x = parts.next()?.parse().ok()?;
            let y = parts.next()?.parse().ok()?;
            let t_ms = parts.next()?.parse().ok()?;
            Some(ReplaySample { x, y, t_ms })
        })
        .collect()
}

/// Run the fixed 15-step enrichment chain against one record, in order,
/// appending `_srv_*` fields to its `QueryString`. Each step is isolated:
/// a failure in one (timeout, lookup error) is swallowed and the chain
/// continues (spec §4.3 error policy).
pub async fn run_chain(
    record: &mut TrackingRecord,
    enrich: &EnrichContext,
    stateful: &StatefulContext,
    pool: Option<&PgPool>,
    now: DateTime<Utc>,
) {
    let signals = ClientSignals::parse(record);
    let user_agent = record.user_agent.clone();
    let ip = record.ip_address.clone();
    let request_path = record.request_path.clone();
    let fingerprint = signals.fingerprint.clone();

    // Step 1 — Bot-UA detection.
    let (is_bot_ua, bot_name) = enrich.bot_ua.detect(&user_agent);
    record.query_string.append_srv("knownBot", if is_bot_ua { "1" } else { "0" });
    if let Some(name) = bot_name {
        record.query_string.append_srv("botName", name);
    }

    // Step 2 — UA parse.
    let ua_fields = enrich.ua_parser.parse(&user_agent);
    if let Some(family) = &ua_fields.browser_family {
        record.query_string.append_srv("browser", family);
    }
    if let Some(os_family) = &ua_fields.os_family {
        record.query_string.append_srv("os", os_family);
    }
    let is_mobile_ua = ua_fields
        .device_type
        .as_deref()
        .map(|t| t.eq_ignore_ascii_case("mobile") || t.eq_ignore_ascii_case("tablet"))
        .unwrap_or(false);
    let is_headless_ua = user_agent.to_ascii_lowercase().contains("headless");

    // Step 3 — Reverse DNS.
    let reverse_dns = enrich.reverse_dns.lookup(&ip).await;
    if let Some(hostname) = &reverse_dns.hostname {
        record.query_string.append_srv("ptrHostname", hostname);
    }
    record.query_string.append_srv("isCloud", if reverse_dns.is_cloud { "1" } else { "0" });

    // Step 4 — Offline geo.
    let offline_geo = enrich.offline_geo.lookup(&ip);
    if let Some(country) = &offline_geo.country_code {
        record.query_string.append_srv("geoCountry", country);
    }
    if let Some(asn) = offline_geo.asn {
        record.query_string.append_srv("asn", &asn.to_string());
    }

    // Step 5 — External geo API, skipped if recently looked up.
    if !enrich.external_geo.is_fresh(&ip, now) {
        if let Some(pool) = pool {
            if let Some(result) = enrich.external_geo.lookup(pool, &ip, now).await {
                if let Some(country) = &result.country_code {
                    record.query_string.append_srv("extGeoCountry", country);
                }
            }
        }
    }

    // Step 6 — WHOIS ASN, skipped if step 4 already found an ASN.
    if !offline_geo.has_asn() {
        let whois = enrich.whois_asn.lookup(&ip).await;
        if let Some(asn) = whois.asn {
            record.query_string.append_srv("whoisAsn", &asn.to_string());
        }
    }

    // Step 7 — Session stitching.
    let session = stateful.session.stitch(&fingerprint, &request_path);
    record.query_string.append_srv("sessionId", &session.session_id);
    record.query_string.append_srv("sessionHitNum", &session.hit_num.to_string());
    record.query_string.append_srv("sessionDurationSec", &session.duration_secs.to_string());
    record.query_string.append_srv("sessionPages", &session.page_count.to_string());

    // Step 8 — Cross-customer intel.
    let cross_customer = stateful.cross_customer.record(&ip, &fingerprint, &record.company_id);
    record
        .query_string
        .append_srv("crossCustHits", &cross_customer.distinct_companies_2h.to_string());
    record.query_string.append_srv("crossCustWindow", "5");
    if cross_customer.is_alert {
        record.query_string.append_srv("crossCustAlert", "1");
    }

    // Step 9 — Device affluence.
    let affluence = enrich.affluence.score(
        signals.gpu.as_deref(),
        signals.cores,
        signals.memory_gb,
        signals.screen_width,
        signals.screen_height,
        signals.platform.as_deref(),
    );
    record.query_string.append_srv("affluence", affluence.tier.as_str());
    if let Some(gpu_tier) = affluence.gpu_tier {
        record.query_string.append_srv("gpuTier", gpu_tier.as_str());
    }

    // Step 10 — Contradiction matrix.
    let has_mouse_movement = signals.mouse_path.as_deref().map(|p| !p.is_empty()).unwrap_or(false);
    let contradiction = evaluate_contradictions(&ContradictionInputs {
        is_mobile_ua,
        screen_width: signals.screen_width,
        screen_height: signals.screen_height,
        has_mouse_movement,
        has_touch_events: signals.has_touch_events,
        cpu_cores: signals.cores,
        device_memory_gb: signals.memory_gb,
        timezone: signals.timezone.as_deref(),
        ip_country: offline_geo.country_code.as_deref(),
        language: signals.language.as_deref(),
        is_headless_ua,
        is_cloud_hostname: reverse_dns.is_cloud,
        plugin_count: signals.plugin_count,
        color_depth: signals.color_depth,
        is_bot_ua,
        session_hit_num: session.hit_num,
        session_duration_secs: session.duration_secs,
    });
    record.query_string.append_srv("contradictions", &contradiction.count.to_string());
    if !contradiction.rule_ids.is_empty() {
        record
            .query_string
            .append_srv("contradictionRules", &contradiction.rule_ids.join(","));
    }

    // Step 11 — Geographic arbitrage.
    let geo_arbitrage = evaluate_geo_arbitrage(&GeoArbitrageInputs {
        fonts_consistent_with_region: signals.fonts_consistent_with_region,
        language: signals.language.as_deref(),
        ip_country: offline_geo.country_code.as_deref(),
        timezone_offset_minutes: signals.timezone_offset_minutes,
        calendar: signals.calendar.as_deref(),
        decimal_separator: signals.decimal_separator,
        group_separator: signals.group_separator,
        date_format_sample: signals.date_format_sample.as_deref(),
        relative_time_locale: signals.relative_time_locale.as_deref(),
    });
    record.query_string.append_srv("culturalScore", &geo_arbitrage.score.to_string());
    if !geo_arbitrage.cultural_flags.is_empty() {
        record
            .query_string
            .append_srv("culturalFlags", &geo_arbitrage.cultural_flags.join(","));
    }

    // Step 12 — Device-age estimation.
    let device_age = estimate_device_age(signals.gpu.as_deref(), signals.os_version.as_deref(), signals.browser_major);
    if let Some(age) = device_age.estimated_age_years {
        record.query_string.append_srv("deviceAgeYears", &age.to_string());
    }
    if !device_age.anomalies.is_empty() {
        record
            .query_string
            .append_srv("deviceAgeAnomalies", &device_age.anomalies.join(","));
    }

    // Step 13 — Behavioral-replay detection.
    let replay_outcome = signals
        .mouse_path
        .as_deref()
        .map(|raw| stateful.replay.check(&parse_mouse_path(raw), &fingerprint))
        .unwrap_or(ReplayOutcome::Novel);
    let is_replay = matches!(replay_outcome, ReplayOutcome::Replayed);
    record.query_string.append_srv(
        "replayOutcome",
        match replay_outcome {
            ReplayOutcome::Novel => "novel",
            ReplayOutcome::Revisit => "revisit",
            ReplayOutcome::Replayed => "replayed",
        },
    );

    // Step 14 — Dead-internet index.
    let dead_internet = stateful.dead_internet.record(
        &record.company_id,
        &fingerprint,
        &HitSignals {
            is_bot: is_bot_ua,
            zero_mouse: !has_mouse_movement,
            is_datacenter: reverse_dns.is_cloud,
            has_contradiction: contradiction.count > 0,
            is_replay,
        },
    );
    if let Some(index) = dead_internet.index {
        record.query_string.append_srv("deadInternetIndex", &index.to_string());
    }

    // Step 15 — Lead-quality scoring.
    let timezone_matches_ip_country = !geo_arbitrage.cultural_flags.contains(&"timezone-offset");
    let lead_score = lead_quality::score(&LeadQualitySignals {
        has_mouse_movement,
        has_keyboard_activity: signals.has_keyboard_activity,
        has_nonzero_scroll: signals.has_nonzero_scroll,
        session_duration_secs: session.duration_secs,
        session_page_count: session.page_count,
        timezone_matches_ip_country,
        contradiction_count: contradiction.count,
        is_cloud_hostname: reverse_dns.is_cloud,
        mouse_entropy_in_human_range: has_mouse_movement && !is_replay,
    });
    record.query_string.append_srv("leadScore", &lead_score.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::config::EnrichmentConfig;
    use crate::domain::record::QueryString;

    fn make_record(query: &str) -> TrackingRecord {
        TrackingRecord {
            company_id: "42".to_string(),
            pixel_id: "px1".to_string(),
            ip_address: "8.8.8.8".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/120 Safari/537.36"
                .to_string(),
            referer: "https://example.com".to_string(),
            query_string: QueryString::from_client(query.to_string()),
            headers_json: "{}".to_string(),
            request_path: "/landing".to_string(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn run_chain_appends_a_srv_field_for_every_step() {
        let enrich = EnrichContext::new(&EnrichmentConfig::default());
        let clock = ManualClock::new(Utc::now());
        let stateful = StatefulContext::new(clock.clone());
        let mut record = make_record("fp=abc123&cores=8&mem=16&sw=2560&sh=1440");

        run_chain(&mut record, &enrich, &stateful, None, clock.now()).await;

        let qs = record.query_string.as_str();
        for key in [
            "_srv_knownBot",
            "_srv_isCloud",
            "_srv_sessionId",
            "_srv_crossCustHits",
            "_srv_affluence",
            "_srv_contradictions",
            "_srv_culturalScore",
            "_srv_replayOutcome",
            "_srv_leadScore",
        ] {
            assert!(qs.contains(key), "missing {key} in {qs}");
        }
    }

    #[tokio::test]
    async fn bot_user_agent_is_flagged_and_scores_low() {
        let enrich = EnrichContext::new(&EnrichmentConfig::default());
        let clock = ManualClock::new(Utc::now());
        let stateful = StatefulContext::new(clock.clone());
        let mut record = make_record("fp=bot_fp");
        record.user_agent = "Googlebot/2.1 (+http://www.google.com/bot.html)".to_string();

        run_chain(&mut record, &enrich, &stateful, None, clock.now()).await;

        assert!(record.query_string.as_str().contains("_srv_knownBot=1"));
        assert!(record.query_string.as_str().contains("_srv_botName=Googlebot"));
    }

    #[test]
    fn parse_mouse_path_parses_semicolon_separated_triples() {
        let samples = parse_mouse_path("10,20,0;15,22,80");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], ReplaySample { x: 10, y: 20, t_ms: 0 });
    }

    #[test]
    fn parse_mouse_path_ignores_malformed_triples() {
        let samples = parse_mouse_path("10,20,0;garbage;30,40,160");
        assert_eq!(samples.len(), 2);
    }
}
