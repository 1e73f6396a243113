//! Step 2 — UA parse (spec §4.4.2): two-pass, browser/OS first, device
//! second. Null input yields an all-null result; this step never fails.

use std::path::Path;

use user_agent_parser::UserAgentParser;

#[derive(Debug, Clone, Default)]
pub struct UaFields {
    pub browser_family: Option<String>,
    pub browser_version: Option<String>,
    pub os_family: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub device_model: Option<String>,
    pub device_brand: Option<String>,
}

pub struct UaParser {
    inner: UserAgentParser,
}

impl UaParser {
    /// `regexes_path` points at a `ua-parser`-format YAML regex table
    /// (operators typically vendor the upstream `regexes.yaml`). Absent or
    /// unreadable is graceful degradation, same contract as the offline
    /// geo databases: the parser falls back to a minimal built-in table
    /// rather than failing startup.
    pub fn new(regexes_path: Option<&Path>) -> Self {
        let inner = regexes_path
            .and_then(|path| UserAgentParser::from_path(path).ok())
            .unwrap_or_else(Self::builtin);
        Self { inner }
    }

    fn builtin() -> UserAgentParser {
        UserAgentParser::from_bytes(BUILTIN_REGEXES).expect("bundled user-agent regex table must parse")
    }

    pub fn parse(&self, user_agent: &str) -> UaFields {
        if user_agent.is_empty() {
            return UaFields::default();
        }

        let product = self.inner.parse_product(user_agent);
        let os = self.inner.parse_os(user_agent);
        let device = self.inner.parse_device(user_agent);

        UaFields {
            browser_family: product.name.map(|s| s.to_string()),
            browser_version: version_string(product.major, product.minor, product.patch),
            os_family: os.name.map(|s| s.to_string()),
            os_version: version_string(os.major, os.minor, os.patch),
            device_type: device.name.map(|s| s.to_string()),
            device_model: device.model.map(|s| s.to_string()),
            device_brand: device.brand.map(|s| s.to_string()),
        }
    }
}

impl Default for UaParser {
    fn default() -> Self {
        Self::new(None)
    }
}

fn version_string(
    major: Option<std::borrow::Cow<str>>,
    minor: Option<std::borrow::Cow<str>>,
    patch: Option<std::borrow::Cow<str>>,
) -> Option<String> {
    let major = major?;
    let mut version = major.to_string();
    if let Some(minor) = minor {
        version.push('.');
        version.push_str(&minor);
        if let Some(patch) = patch {
            version.push('.');
            version.push_str(&patch);
        }
    }
    Some(version)
}

/// A minimal embedded fallback table used only if the bundled YAML asset is
/// missing from the install; keeps startup graceful (spec §9 "Graceful
/// degradation") rather than panicking when an optional data file is absent.
const BUILTIN_REGEXES: &[u8] = b"user_agent_parsers:\n  - regex: '(Chrome)/(\\d+)\\.(\\d+)\\.(\\d+)'\nos_parsers:\n  - regex: 'Mac OS X (\\d+)[_.](\\d+)'\n    os_replacement: 'Mac OS X'\ndevice_parsers:\n  - regex: '(Macintosh)'\n    device_replacement: 'Mac'\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_agent_yields_all_null() {
        let parser = UaParser::default();
        let fields = parser.parse("");
        assert!(fields.browser_family.is_none());
        assert!(fields.os_family.is_none());
        assert!(fields.device_type.is_none());
    }

    #[test]
    fn parsing_never_panics_on_garbage_input() {
        let parser = UaParser::default();
        let _ = parser.parse("not even remotely a user agent string \u{0}\u{1}");
    }
}
