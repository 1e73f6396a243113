//! Step 9 — Device affluence (spec §4.4.7): deterministic scoring from GPU
//! tier, CPU cores, memory, screen resolution, and platform. GPU pattern
//! ordering matters — more specific patterns must precede catch-alls.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffluenceTier {
    High,
    Mid,
    Low,
}

impl AffluenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AffluenceTier::High => "HIGH",
            AffluenceTier::Mid => "MID",
            AffluenceTier::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuTier {
    High,
    Mid,
    Low,
}

impl GpuTier {
    fn points(self) -> u32 {
        match self {
            GpuTier::High => 40,
            GpuTier::Mid => 25,
            GpuTier::Low => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GpuTier::High => "HIGH",
            GpuTier::Mid => "MID",
            GpuTier::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AffluenceResult {
    pub tier: AffluenceTier,
    pub gpu_tier: Option<GpuTier>,
    pub score: u32,
}

pub struct DeviceAffluenceScorer {
    /// (pattern, tier) in priority order — checked top to bottom, first
    /// match wins. Specific renderer names (e.g. "Quadro RTX") must sort
    /// above their catch-all family (e.g. "RTX 5").
    gpu_patterns: Vec<(Regex, GpuTier)>,
}

impl DeviceAffluenceScorer {
    pub fn new() -> Self {
        let table: &[(&str, GpuTier)] = &[
            (r"(?i)quadro\s*rtx", GpuTier::High),
            (r"(?i)rtx\s*[4-9]0\d\d", GpuTier::High),
            (r"(?i)rtx\s*5\d\d\d", GpuTier::High),
            (r"(?i)radeon\s*pro", GpuTier::High),
            (r"(?i)apple\s*m[1-9]\s*(pro|max|ultra)", GpuTier::High),
            (r"(?i)rtx\s*3\d\d\d", GpuTier::Mid),
            (r"(?i)rtx\s*2\d\d\d", GpuTier::Mid),
            (r"(?i)gtx\s*1[06]\d\d", GpuTier::Mid),
            (r"(?i)radeon\s*rx", GpuTier::Mid),
            (r"(?i)apple\s*m[1-9]\b", GpuTier::Mid),
            (r"(?i)iris\s*(plus|xe)", GpuTier::Mid),
            (r"(?i)gtx\s*[4-9]\d\d", GpuTier::Low),
            (r"(?i)intel.*hd\s*graphics", GpuTier::Low),
            (r"(?i)intel.*uhd", GpuTier::Low),
            (r"(?i)mali-", GpuTier::Low),
            (r"(?i)adreno", GpuTier::Low),
            (r"(?i)powervr", GpuTier::Low),
            (r"(?i)swiftshader", GpuTier::Low),
            (r"(?i)llvmpipe", GpuTier::Low),
        ];
        let gpu_patterns = table
            .iter()
            .map(|(pattern, tier)| (Regex::new(pattern).expect("static GPU pattern is valid"), *tier))
            .collect();
        Self { gpu_patterns }
    }

    pub fn score(
        &self,
        gpu: Option<&str>,
        cores: Option<u32>,
        memory_gb: Option<u32>,
        screen_width: Option<u32>,
        screen_height: Option<u32>,
        platform: Option<&str>,
    ) -> AffluenceResult {
        let gpu_tier = gpu.and_then(|g| self.classify_gpu(g));
        let mut score = gpu_tier.map(GpuTier::points).unwrap_or(0);

        score += match cores {
            Some(c) if c >= 10 => 15,
            Some(c) if c >= 6 => 10,
            Some(c) if c >= 1 => 5,
            _ => 0,
        };

        score += match memory_gb {
            Some(m) if m >= 16 => 15,
            Some(m) if m >= 8 => 10,
            Some(m) if m >= 1 => 5,
            _ => 0,
        };

        let megapixels = match (screen_width, screen_height) {
            (Some(w), Some(h)) => (w as f64 * h as f64) / 1_000_000.0,
            _ => 0.0,
        };
        score += if megapixels >= 3.0 {
            10
        } else if megapixels > 0.0 {
            5
        } else {
            0
        };

        if is_apple_platform(platform) {
            score += 10;
        }

        let tier = if score >= 60 {
            AffluenceTier::High
        } else if score >= 30 {
            AffluenceTier::Mid
        } else {
            AffluenceTier::Low
        };

        AffluenceResult {
            tier,
            gpu_tier,
            score,
        }
    }

    fn classify_gpu(&self, gpu: &str) -> Option<GpuTier> {
        self.gpu_patterns
            .iter()
            .find(|(pattern, _)| pattern.is_match(gpu))
            .map(|(_, tier)| *tier)
    }
}

impl Default for DeviceAffluenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_apple_platform(platform: Option<&str>) -> bool {
    platform
        .map(|p| {
            let lower = p.to_ascii_lowercase();
            lower.contains("mac") || lower.contains("iphone") || lower.contains("ipad")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_end_desktop_scores_high() {
        let scorer = DeviceAffluenceScorer::new();
        let result = scorer.score(Some("Apple M1 Pro"), Some(10), Some(16), Some(2560), Some(1440), Some("MacIntel"));
        assert_eq!(result.tier, AffluenceTier::High);
        assert_eq!(result.gpu_tier, Some(GpuTier::High));
    }

    #[test]
    fn low_end_device_scores_low() {
        let scorer = DeviceAffluenceScorer::new();
        let result = scorer.score(Some("Adreno 610"), Some(4), Some(3), Some(720), Some(1600), Some("Linux armv8l"));
        assert_eq!(result.tier, AffluenceTier::Low);
    }

    #[test]
    fn specific_quadro_pattern_wins_over_rtx_catchall() {
        let scorer = DeviceAffluenceScorer::new();
        let tier = scorer.classify_gpu("NVIDIA Quadro RTX 5000");
        assert_eq!(tier, Some(GpuTier::High));
    }

    #[test]
    fn missing_fields_yield_low_tier_without_panicking() {
        let scorer = DeviceAffluenceScorer::new();
        let result = scorer.score(None, None, None, None, None, None);
        assert_eq!(result.tier, AffluenceTier::Low);
        assert_eq!(result.score, 0);
    }
}
