//! Step 15 — Lead-quality scoring (spec §4.4.8): weighted sum of nine
//! signals gathered from earlier steps. Runs last so every upstream
//! `_srv_*` field it consumes has already been written.

/// Inputs to the lead-quality score, gathered from the record's
/// client-provided fields and the `_srv_*` fields written by steps 1-14.
#[derive(Debug, Clone, Default)]
pub struct LeadQualitySignals {
    pub has_mouse_movement: bool,
    pub has_keyboard_activity: bool,
    pub has_nonzero_scroll: bool,
    pub session_duration_secs: i64,
    pub session_page_count: usize,
    pub timezone_matches_ip_country: bool,
    pub contradiction_count: u32,
    pub is_cloud_hostname: bool,
    pub mouse_entropy_in_human_range: bool,
}

const SESSION_DURATION_THRESHOLD_SECS: i64 = 30;

/// Each signal contributes a fixed weight to a 0-100 score. Weights sum to
/// 100 so a record that trips every positive signal and none of the
/// negative ones scores exactly 100.
const WEIGHT_MOUSE_MOVEMENT: u32 = 12;
const WEIGHT_KEYBOARD_ACTIVITY: u32 = 10;
const WEIGHT_NONZERO_SCROLL: u32 = 10;
const WEIGHT_SESSION_DURATION: u32 = 12;
const WEIGHT_MULTI_PAGE: u32 = 12;
const WEIGHT_TIMEZONE_MATCH: u32 = 12;
const WEIGHT_ZERO_CONTRADICTIONS: u32 = 12;
const WEIGHT_NON_CLOUD: u32 = 10;
const WEIGHT_HUMAN_ENTROPY: u32 = 10;

pub fn score(signals: &LeadQualitySignals) -> u32 {
    let mut total = 0u32;

    if signals.has_mouse_movement {
        total += WEIGHT_MOUSE_MOVEMENT;
    }
    if signals.has_keyboard_activity {
        total += WEIGHT_KEYBOARD_ACTIVITY;
    }
    if signals.has_nonzero_scroll {
        total += WEIGHT_NONZERO_SCROLL;
    }
    if signals.session_duration_secs > SESSION_DURATION_THRESHOLD_SECS {
        total += WEIGHT_SESSION_DURATION;
    }
    if signals.session_page_count > 1 {
        total += WEIGHT_MULTI_PAGE;
    }
    if signals.timezone_matches_ip_country {
        total += WEIGHT_TIMEZONE_MATCH;
    }
    if signals.contradiction_count == 0 {
        total += WEIGHT_ZERO_CONTRADICTIONS;
    }
    if !signals.is_cloud_hostname {
        total += WEIGHT_NON_CLOUD;
    }
    if signals.mouse_entropy_in_human_range {
        total += WEIGHT_HUMAN_ENTROPY;
    }

    total.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_human_visitor_scores_high() {
        let signals = LeadQualitySignals {
            has_mouse_movement: true,
            has_keyboard_activity: true,
            has_nonzero_scroll: true,
            session_duration_secs: 120,
            session_page_count: 1,
            timezone_matches_ip_country: true,
            contradiction_count: 0,
            is_cloud_hostname: false,
            mouse_entropy_in_human_range: true,
        };
        assert!(score(&signals) >= 70);
    }

    #[test]
    fn known_bot_scores_low() {
        let signals = LeadQualitySignals {
            has_mouse_movement: false,
            has_keyboard_activity: false,
            has_nonzero_scroll: false,
            session_duration_secs: 0,
            session_page_count: 1,
            timezone_matches_ip_country: false,
            contradiction_count: 4,
            is_cloud_hostname: true,
            mouse_entropy_in_human_range: false,
        };
        assert!(score(&signals) <= 10);
    }

    #[test]
    fn score_never_exceeds_100() {
        let signals = LeadQualitySignals {
            has_mouse_movement: true,
            has_keyboard_activity: true,
            has_nonzero_scroll: true,
            session_duration_secs: 9999,
            session_page_count: 5,
            timezone_matches_ip_country: true,
            contradiction_count: 0,
            is_cloud_hostname: false,
            mouse_entropy_in_human_range: true,
        };
        assert_eq!(score(&signals), 100);
    }
}
