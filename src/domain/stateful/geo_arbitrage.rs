//! Geographic arbitrage (spec §4.5.4, step 11): seven weighted checks
//! comparing declared locale signals against the IP-derived country.
//! Higher score means more internally-consistent; failing checks are
//! listed so downstream scoring/alerting can see exactly which signal
//! tripped.

#[derive(Debug, Clone, Default)]
pub struct GeoArbitrageInputs<'a> {
    pub fonts_consistent_with_region: Option<bool>,
    pub language: Option<&'a str>,
    pub ip_country: Option<&'a str>,
    pub timezone_offset_minutes: Option<i32>,
    pub calendar: Option<&'a str>,
    pub decimal_separator: Option<char>,
    pub group_separator: Option<char>,
    pub date_format_sample: Option<&'a str>,
    pub relative_time_locale: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct GeoArbitrageResult {
    pub score: u32,
    pub cultural_flags: Vec<&'static str>,
}

struct Check {
    id: &'static str,
    weight: u32,
    evaluate: fn(&GeoArbitrageInputs) -> Option<bool>,
}

/// Seven weighted sub-checks (spec §4.5.4); weights sum to 100 so `score` is
/// directly a 0-100 percentage of signals that agree with the IP country.
/// A check that can't be evaluated (missing input) contributes neither to
/// the score nor to the flag list — it is simply skipped.
const CHECKS: &[Check] = &[
    Check {
        id: "font-distribution",
        weight: 10,
        evaluate: |i| i.fonts_consistent_with_region,
    },
    Check {
        id: "primary-language",
        weight: 20,
        evaluate: language_matches_country,
    },
    Check {
        id: "timezone-offset",
        weight: 20,
        evaluate: timezone_matches_country,
    },
    Check {
        id: "calendar-system",
        weight: 10,
        evaluate: calendar_matches_country,
    },
    Check {
        id: "number-format",
        weight: 15,
        evaluate: number_format_matches_country,
    },
    Check {
        id: "date-format",
        weight: 15,
        evaluate: date_format_matches_country,
    },
    Check {
        id: "relative-time-locale",
        weight: 10,
        evaluate: |i| i.relative_time_locale.zip(i.ip_country).map(|(rt, c)| locale_country_prefix(rt) == Some(c)),
    },
];

pub fn evaluate(inputs: &GeoArbitrageInputs) -> GeoArbitrageResult {
    let mut earned = 0u32;
    let mut evaluable_weight = 0u32;
    let mut cultural_flags = Vec::new();

    for check in CHECKS {
        match (check.evaluate)(inputs) {
            Some(true) => {
                earned += check.weight;
                evaluable_weight += check.weight;
            }
            Some(false) => {
                evaluable_weight += check.weight;
                cultural_flags.push(check.id);
            }
            None => {}
        }
    }

    let score = if evaluable_weight == 0 {
        100
    } else {
        (earned * 100 / evaluable_weight).min(100)
    };

    GeoArbitrageResult { score, cultural_flags }
}

fn language_matches_country(i: &GeoArbitrageInputs) -> Option<bool> {
    let lang = i.language?;
    let country = i.ip_country?;
    let lang_country = lang.split(['-', '_']).nth(1).unwrap_or("");
    Some(lang_country.eq_ignore_ascii_case(country) || majority_language_for(country).map(|l| lang.starts_with(l)).unwrap_or(true))
}

fn timezone_matches_country(i: &GeoArbitrageInputs) -> Option<bool> {
    let offset = i.timezone_offset_minutes?;
    let country = i.ip_country?;
    let plausible_range = country_utc_offset_range(country)?;
    Some(offset >= plausible_range.0 && offset <= plausible_range.1)
}

fn calendar_matches_country(i: &GeoArbitrageInputs) -> Option<bool> {
    let calendar = i.calendar?;
    let country = i.ip_country?;
    let expected = match country.to_ascii_uppercase().as_str() {
        "TH" => "buddhist",
        "SA" | "AE" => "islamic",
        "IL" => "hebrew",
        "JP" => "japanese",
        _ => "gregory",
    };
    Some(calendar.eq_ignore_ascii_case(expected))
}

fn number_format_matches_country(i: &GeoArbitrageInputs) -> Option<bool> {
    let decimal = i.decimal_separator?;
    let country = i.ip_country?;
    let expected_decimal = if comma_decimal_country(country) { ',' } else { '.' };
    Some(decimal == expected_decimal)
}

fn date_format_matches_country(i: &GeoArbitrageInputs) -> Option<bool> {
    let sample = i.date_format_sample?;
    let country = i.ip_country?;
    let us_style = sample.splitn(3, '/').next().map(|s| s.len() <= 2).unwrap_or(false) && sample.contains('/');
    Some(if country.eq_ignore_ascii_case("US") { us_style } else { true })
}

fn comma_decimal_country(country: &str) -> bool {
    matches!(
        country.to_ascii_uppercase().as_str(),
        "DE" | "FR" | "IT" | "ES" | "NL" | "RU" | "BR" | "PL"
    )
}

fn majority_language_for(country: &str) -> Option<&'static str> {
    Some(match country.to_ascii_uppercase().as_str() {
        "US" | "GB" | "AU" | "CA" | "NZ" => "en",
        "FR" => "fr",
        "DE" => "de",
        "ES" | "MX" | "AR" => "es",
        "JP" => "ja",
        "CN" => "zh",
        _ => return None,
    })
}

/// Coarse UTC-offset-in-minutes band a country's population falls within.
fn country_utc_offset_range(country: &str) -> Option<(i32, i32)> {
    Some(match country.to_ascii_uppercase().as_str() {
        "US" => (-600, -240),
        "CA" => (-540, -180),
        "GB" | "IE" | "PT" => (-60, 60),
        "FR" | "DE" | "IT" | "ES" | "NL" => (0, 120),
        "JP" | "KR" => (540, 540),
        "CN" => (480, 480),
        "AU" => (480, 660),
        "IN" => (330, 330),
        _ => return None,
    })
}

fn locale_country_prefix(locale: &str) -> Option<&str> {
    locale.split(['-', '_']).nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_consistent_us_visitor_scores_high() {
        let inputs = GeoArbitrageInputs {
            fonts_consistent_with_region: Some(true),
            language: Some("en-US"),
            ip_country: Some("US"),
            timezone_offset_minutes: Some(-480),
            calendar: Some("gregory"),
            decimal_separator: Some('.'),
            group_separator: Some(','),
            date_format_sample: Some("07/28/2026"),
            relative_time_locale: Some("en-US"),
        };
        let result = evaluate(&inputs);
        assert_eq!(result.score, 100);
        assert!(result.cultural_flags.is_empty());
    }

    #[test]
    fn mismatched_timezone_is_flagged() {
        let inputs = GeoArbitrageInputs {
            ip_country: Some("US"),
            timezone_offset_minutes: Some(540),
            ..Default::default()
        };
        let result = evaluate(&inputs);
        assert!(result.cultural_flags.contains(&"timezone-offset"));
    }

    #[test]
    fn missing_signals_are_skipped_not_penalized() {
        let inputs = GeoArbitrageInputs::default();
        let result = evaluate(&inputs);
        assert_eq!(result.score, 100);
        assert!(result.cultural_flags.is_empty());
    }
}
