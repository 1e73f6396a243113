//! Contradiction matrix (spec §4.5.3, step 10): 13 fixed rules evaluated
//! over the record's current field set, including `_srv_*` outputs written
//! by earlier steps. Grouped with the other Component E services per the
//! spec's component table even though evaluation itself needs no
//! cross-record state — only the record in hand.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Impossible,
    Improbable,
    Suspicious,
}

/// Everything a contradiction rule needs to read, gathered by the pipeline
/// from the client-provided query string and the `_srv_*` fields steps 1-9
/// have already written.
#[derive(Debug, Clone, Default)]
pub struct ContradictionInputs<'a> {
    pub is_mobile_ua: bool,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub has_mouse_movement: bool,
    pub has_touch_events: bool,
    pub cpu_cores: Option<u32>,
    pub device_memory_gb: Option<u32>,
    pub timezone: Option<&'a str>,
    pub ip_country: Option<&'a str>,
    pub language: Option<&'a str>,
    pub is_headless_ua: bool,
    pub is_cloud_hostname: bool,
    pub plugin_count: Option<u32>,
    pub color_depth: Option<u32>,
    pub is_bot_ua: bool,
    pub session_hit_num: u64,
    pub session_duration_secs: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ContradictionResult {
    pub count: u32,
    pub rule_ids: Vec<&'static str>,
}

struct Rule {
    id: &'static str,
    severity: Severity,
    check: fn(&ContradictionInputs) -> bool,
}

/// 7 IMPOSSIBLE, 3 IMPROBABLE, 3 SUSPICIOUS — exactly matching spec §4.5.3's
/// tier counts.
const RULES: &[Rule] = &[
    Rule {
        id: "IMP-01-mobile-4k-mouse",
        severity: Severity::Impossible,
        check: |i| i.is_mobile_ua && is_4k_or_larger(i) && i.has_mouse_movement,
    },
    Rule {
        id: "IMP-02-headless-human-session",
        severity: Severity::Impossible,
        check: |i| i.is_headless_ua && i.session_hit_num > 1 && i.session_duration_secs > 60,
    },
    Rule {
        id: "IMP-03-bot-ua-with-mouse-and-touch",
        severity: Severity::Impossible,
        check: |i| i.is_bot_ua && i.has_mouse_movement && i.has_touch_events,
    },
    Rule {
        id: "IMP-04-no-plugins-desktop-high-color",
        severity: Severity::Impossible,
        check: |i| !i.is_mobile_ua && i.plugin_count == Some(0) && i.color_depth.unwrap_or(0) >= 30,
    },
    Rule {
        id: "IMP-05-zero-cores-with-activity",
        severity: Severity::Impossible,
        check: |i| i.cpu_cores == Some(0) && (i.has_mouse_movement || i.has_touch_events),
    },
    Rule {
        id: "IMP-06-touch-and-no-mobile-ua-high-res",
        severity: Severity::Impossible,
        check: |i| i.has_touch_events && !i.is_mobile_ua && is_4k_or_larger(i),
    },
    Rule {
        id: "IMP-07-bot-ua-plausible-hardware",
        severity: Severity::Impossible,
        check: |i| i.is_bot_ua && i.device_memory_gb.unwrap_or(0) >= 8 && i.cpu_cores.unwrap_or(0) >= 4,
    },
    Rule {
        id: "IMPR-01-cloud-hostname-long-session",
        severity: Severity::Improbable,
        check: |i| i.is_cloud_hostname && i.session_duration_secs > 300,
    },
    Rule {
        id: "IMPR-02-timezone-country-mismatch",
        severity: Severity::Improbable,
        check: timezone_country_mismatch,
    },
    Rule {
        id: "IMPR-03-minimal-memory-high-res",
        severity: Severity::Improbable,
        check: |i| i.device_memory_gb.unwrap_or(99) <= 1 && is_4k_or_larger(i),
    },
    Rule {
        id: "SUS-01-no-language-header",
        severity: Severity::Suspicious,
        check: |i| i.language.is_none(),
    },
    Rule {
        id: "SUS-02-single-hit-long-session",
        severity: Severity::Suspicious,
        check: |i| i.session_hit_num == 1 && i.session_duration_secs > 1_800,
    },
    Rule {
        id: "SUS-03-unusual-plugin-count",
        severity: Severity::Suspicious,
        check: |i| !i.is_mobile_ua && i.plugin_count.unwrap_or(1) == 0,
    },
];

fn is_4k_or_larger(i: &ContradictionInputs) -> bool {
    match (i.screen_width, i.screen_height) {
        (Some(w), Some(h)) => w as u64 * h as u64 >= 3840 * 2160,
        _ => false,
    }
}

fn timezone_country_mismatch(i: &ContradictionInputs) -> bool {
    let (Some(tz), Some(country)) = (i.timezone, i.ip_country) else {
        return false;
    };
    // Coarse continent-prefix check; a true mismatch needs the full IANA
    // timezone-to-country table, out of scope for this fixed rule set.
    let tz_region = tz.split('/').next().unwrap_or("");
    let plausible = match country.to_ascii_uppercase().as_str() {
        "US" | "CA" | "MX" => tz_region == "America",
        "GB" | "FR" | "DE" | "IT" | "ES" | "NL" => tz_region == "Europe",
        "JP" | "CN" | "KR" | "IN" => tz_region == "Asia",
        "AU" | "NZ" => tz_region == "Australia" || tz_region == "Pacific",
        _ => true,
    };
    !plausible
}

pub fn evaluate(inputs: &ContradictionInputs) -> ContradictionResult {
    let mut rule_ids = Vec::new();
    for rule in RULES {
        if (rule.check)(inputs) {
            rule_ids.push(rule.id);
        }
    }
    ContradictionResult {
        count: rule_ids.len() as u32,
        rule_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_record_has_no_contradictions() {
        let inputs = ContradictionInputs {
            is_mobile_ua: false,
            screen_width: Some(2560),
            screen_height: Some(1440),
            has_mouse_movement: true,
            language: Some("en-US"),
            timezone: Some("America/Los_Angeles"),
            ip_country: Some("US"),
            plugin_count: Some(3),
            color_depth: Some(24),
            session_hit_num: 1,
            session_duration_secs: 45,
            ..Default::default()
        };
        let result = evaluate(&inputs);
        assert_eq!(result.count, 0);
    }

    #[test]
    fn mobile_ua_with_4k_and_mouse_is_impossible() {
        let inputs = ContradictionInputs {
            is_mobile_ua: true,
            screen_width: Some(3840),
            screen_height: Some(2160),
            has_mouse_movement: true,
            ..Default::default()
        };
        let result = evaluate(&inputs);
        assert!(result.rule_ids.contains(&"IMP-01-mobile-4k-mouse"));
    }

    #[test]
    fn mismatched_timezone_and_country_is_flagged() {
        let inputs = ContradictionInputs {
            timezone: Some("Asia/Tokyo"),
            ip_country: Some("US"),
            language: Some("en-US"),
            plugin_count: Some(2),
            ..Default::default()
        };
        let result = evaluate(&inputs);
        assert!(result.rule_ids.contains(&"IMPR-02-timezone-country-mismatch"));
    }

    #[test]
    fn rule_count_matches_spec_tier_totals() {
        let impossible = RULES.iter().filter(|r| r.severity == Severity::Impossible).count();
        let improbable = RULES.iter().filter(|r| r.severity == Severity::Improbable).count();
        let suspicious = RULES.iter().filter(|r| r.severity == Severity::Suspicious).count();
        assert_eq!((impossible, improbable, suspicious), (7, 3, 3));
    }
}
