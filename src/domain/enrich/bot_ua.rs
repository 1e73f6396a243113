//! Step 1 — Bot-UA detection (spec §4.4.1).

use regex::Regex;

pub struct BotUaDetector {
    patterns: Vec<(Regex, &'static str)>,
}

impl BotUaDetector {
    pub fn new() -> Self {
        let table: &[(&str, &str)] = &[
            (r"(?i)googlebot", "Googlebot"),
            (r"(?i)bingbot", "Bingbot"),
            (r"(?i)slurp", "Yahoo! Slurp"),
            (r"(?i)duckduckbot", "DuckDuckBot"),
            (r"(?i)baiduspider", "Baiduspider"),
            (r"(?i)yandexbot", "YandexBot"),
            (r"(?i)facebookexternalhit", "Facebook"),
            (r"(?i)twitterbot", "Twitterbot"),
            (r"(?i)linkedinbot", "LinkedInBot"),
            (r"(?i)ahrefsbot", "AhrefsBot"),
            (r"(?i)semrushbot", "SemrushBot"),
            (r"(?i)mj12bot", "MJ12bot"),
            (r"(?i)dotbot", "DotBot"),
            (r"(?i)petalbot", "PetalBot"),
            (r"(?i)applebot", "Applebot"),
            (r"(?i)\bcrawler\b", "GenericCrawler"),
            (r"(?i)\bspider\b", "GenericSpider"),
            (r"(?i)headlesschrome", "HeadlessChrome"),
            (r"(?i)\bbot\b", "GenericBot"),
            (r"(?i)curl/", "curl"),
            (r"(?i)python-requests", "python-requests"),
            (r"(?i)go-http-client", "go-http-client"),
        ];

        let patterns = table
            .iter()
            .map(|(pattern, name)| (Regex::new(pattern).expect("static bot pattern is valid"), *name))
            .collect();

        Self { patterns }
    }

    /// Returns `(is_bot, bot_name)`. Patterns are checked in table order so
    /// more specific names win over the generic catch-alls at the bottom.
    pub fn detect(&self, user_agent: &str) -> (bool, Option<&'static str>) {
        if user_agent.is_empty() {
            return (false, None);
        }
        for (pattern, name) in &self.patterns {
            if pattern.is_match(user_agent) {
                return (true, Some(name));
            }
        }
        (false, None)
    }
}

impl Default for BotUaDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_googlebot() {
        let detector = BotUaDetector::new();
        let (is_bot, name) = detector.detect("Googlebot/2.1 (+http://www.google.com/bot.html)");
        assert!(is_bot);
        assert_eq!(name, Some("Googlebot"));
    }

    #[test]
    fn leaves_human_user_agents_alone() {
        let detector = BotUaDetector::new();
        let (is_bot, name) = detector.detect(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36",
        );
        assert!(!is_bot);
        assert_eq!(name, None);
    }

    #[test]
    fn empty_user_agent_is_not_a_bot() {
        let detector = BotUaDetector::new();
        assert_eq!(detector.detect(""), (false, None));
    }
}
