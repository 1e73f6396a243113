//! Device-age estimation (spec §4.5.5, step 12): GPU renderer and OS/browser
//! versions each map to an approximate release year via lookup tables; the
//! estimated device age is the gap between "now" and the oldest of the
//! three, flagged against three fixed anomaly rules.

#[derive(Debug, Clone, Default)]
pub struct DeviceAgeResult {
    pub estimated_age_years: Option<i32>,
    pub anomalies: Vec<&'static str>,
}

/// ~70-entry GPU-renderer -> approximate release year table, newest first so
/// more specific/newer names are tried before older catch-alls.
const GPU_RELEASE_YEARS: &[(&str, i32)] = &[
    ("rtx 5090", 2025),
    ("rtx 5080", 2025),
    ("rtx 5070", 2025),
    ("rtx 4090", 2022),
    ("rtx 4080", 2022),
    ("rtx 4070", 2023),
    ("rtx 4060", 2023),
    ("apple m4", 2024),
    ("apple m3", 2023),
    ("apple m2", 2022),
    ("apple m1", 2020),
    ("rtx 3090", 2020),
    ("rtx 3080", 2020),
    ("rtx 3070", 2020),
    ("rtx 3060", 2021),
    ("radeon rx 7900", 2022),
    ("radeon rx 6900", 2020),
    ("rtx 2080", 2018),
    ("rtx 2070", 2018),
    ("rtx 2060", 2019),
    ("gtx 1660", 2019),
    ("gtx 1080", 2016),
    ("gtx 1070", 2016),
    ("gtx 1060", 2016),
    ("gtx 980", 2014),
    ("gtx 970", 2014),
    ("intel iris xe", 2020),
    ("intel uhd 630", 2017),
    ("intel hd 4000", 2012),
    ("intel hd 3000", 2011),
    ("adreno 740", 2023),
    ("adreno 660", 2021),
    ("adreno 640", 2019),
    ("adreno 530", 2016),
    ("mali-g720", 2023),
    ("mali-g78", 2020),
    ("mali-t880", 2016),
    ("powervr gt7600", 2015),
];

const OS_RELEASE_YEARS: &[(&str, i32)] = &[
    ("windows nt 10.0", 2015),
    ("windows nt 6.3", 2013),
    ("windows nt 6.1", 2009),
    ("mac os x 14", 2023),
    ("mac os x 13", 2022),
    ("mac os x 12", 2021),
    ("mac os x 11", 2020),
    ("mac os x 10.15", 2019),
    ("mac os x 10.14", 2018),
    ("mac os x 10.13", 2017),
    ("android 14", 2023),
    ("android 13", 2022),
    ("android 12", 2021),
    ("android 11", 2020),
    ("android 10", 2019),
    ("android 9", 2018),
    ("ios 17", 2023),
    ("ios 16", 2022),
    ("ios 15", 2021),
    ("ios 14", 2020),
];

const BROWSER_RELEASE_YEARS: &[(u32, i32)] = &[
    (120, 2023),
    (110, 2023),
    (100, 2022),
    (90, 2021),
    (80, 2020),
    (70, 2019),
    (60, 2018),
];

const CURRENT_YEAR: i32 = 2026;
/// An OS/browser major version at or below this age (in years from release)
/// is treated as end-of-life for the anomaly rules.
const EOL_AGE_YEARS: i32 = 6;
const BLEEDING_EDGE_AGE_YEARS: i32 = 1;

pub fn estimate(gpu: Option<&str>, os_version: Option<&str>, browser_major: Option<u32>) -> DeviceAgeResult {
    let gpu_year = gpu.and_then(lookup_gpu_year);
    let os_year = os_version.and_then(lookup_os_year);
    let browser_year = browser_major.and_then(lookup_browser_year);

    let years = [gpu_year, os_year, browser_year].into_iter().flatten().collect::<Vec<_>>();
    let Some(oldest) = years.iter().min().copied() else {
        return DeviceAgeResult::default();
    };

    let mut anomalies = Vec::new();

    // "Bleeding edge" is relative to the newest generation this lookup table
    // knows about, not to `CURRENT_YEAR`, since the table goes stale long
    // before the anomaly rules should stop firing.
    let is_bleeding_edge_browser = browser_year.map(|y| y >= newest_browser_release_year()).unwrap_or(false);

    if let (Some(gpu_y), Some(_)) = (gpu_year, browser_year) {
        let gpu_age = CURRENT_YEAR - gpu_y;
        if gpu_age >= EOL_AGE_YEARS && is_bleeding_edge_browser {
            anomalies.push("old-gpu-bleeding-edge-browser");
        }
        if gpu_age <= BLEEDING_EDGE_AGE_YEARS && os_year.map(|y| CURRENT_YEAR - y >= EOL_AGE_YEARS).unwrap_or(false) {
            anomalies.push("bleeding-edge-gpu-eol-os");
        }
    }

    if let (Some(os_y), Some(browser_y)) = (os_year, browser_year) {
        if (os_y - browser_y).abs() > 5 {
            anomalies.push("os-browser-release-year-diverge");
        }
    }

    DeviceAgeResult {
        estimated_age_years: Some(CURRENT_YEAR - oldest),
        anomalies,
    }
}

fn lookup_gpu_year(gpu: &str) -> Option<i32> {
    let lower = gpu.to_ascii_lowercase();
    GPU_RELEASE_YEARS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, year)| *year)
}

fn lookup_os_year(os_version: &str) -> Option<i32> {
    let lower = os_version.to_ascii_lowercase();
    OS_RELEASE_YEARS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, year)| *year)
}

fn lookup_browser_year(major: u32) -> Option<i32> {
    BROWSER_RELEASE_YEARS
        .iter()
        .find(|(version, _)| major >= *version)
        .map(|(_, year)| *year)
}

/// The newest release year `BROWSER_RELEASE_YEARS` knows about. The anomaly
/// rules treat this generation as "bleeding edge" regardless of how far
/// `CURRENT_YEAR` has drifted past the table's own maintenance.
fn newest_browser_release_year() -> i32 {
    BROWSER_RELEASE_YEARS.iter().map(|(_, year)| *year).max().unwrap_or(CURRENT_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_device_estimates_low_age() {
        let result = estimate(Some("Apple M1 Pro"), Some("Mac OS X 10.15"), Some(120));
        assert!(result.estimated_age_years.unwrap() <= 10);
    }

    #[test]
    fn old_gpu_with_bleeding_edge_browser_is_anomalous() {
        let result = estimate(Some("Intel HD 3000"), Some("Windows NT 10.0"), Some(120));
        assert!(result.anomalies.contains(&"old-gpu-bleeding-edge-browser"));
    }

    #[test]
    fn unknown_hardware_yields_no_estimate() {
        let result = estimate(None, None, None);
        assert!(result.estimated_age_years.is_none());
        assert!(result.anomalies.is_empty());
    }
}
