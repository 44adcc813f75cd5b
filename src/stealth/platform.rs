//! Social-media platform detection and per-platform launch flags.
//!
//! Grounded in spec.md §6's launch-flags table and §4.5's "recognized
//! platform" hook. Detection is a case-insensitive substring match against
//! either the task description or the first navigated URL — no external
//! config table is consulted (that storage mechanism is out of scope; its
//! *content*, reproduced here, is in scope).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    LinkedIn,
    Facebook,
    Twitter,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Instagram,
        Platform::LinkedIn,
        Platform::Facebook,
        Platform::Twitter,
        Platform::TikTok,
    ];

    /// Name and known domains used for detection.
    fn name_and_domains(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Platform::Instagram => ("instagram", &["instagram.com"]),
            Platform::LinkedIn => ("linkedin", &["linkedin.com"]),
            Platform::Facebook => ("facebook", &["facebook.com"]),
            Platform::Twitter => ("twitter", &["twitter.com", "x.com"]),
            Platform::TikTok => ("tiktok", &["tiktok.com"]),
        }
    }

    /// Additional Chrome launch flags for this platform (spec.md §6 table).
    pub fn launch_flags(self) -> &'static [&'static str] {
        match self {
            Platform::Instagram => &[
                "--disable-features=VizDisplayCompositor",
                "--disable-web-security",
                "--allow-running-insecure-content",
                "--disable-site-isolation-trials",
            ],
            Platform::LinkedIn => &[
                "--enable-features=NetworkService",
                "--disable-client-side-phishing-detection",
                "--disable-component-extensions-with-background-pages",
            ],
            Platform::Facebook => &[
                "--disable-features=TranslateUI",
                "--disable-background-timer-throttling",
                "--disable-backgrounding-occluded-windows",
            ],
            Platform::Twitter => &[
                "--force-color-profile=srgb",
                "--metrics-recording-only",
                "--disable-domain-reliability",
            ],
            Platform::TikTok => &[
                "--use-mock-keychain",
                "--disable-component-update",
                "--aggressive-cache-discard",
            ],
        }
    }
}

/// Detect a platform from a task description and/or a first-navigated URL.
/// Case-insensitive substring match against the platform's name or any of
/// its known domains (spec.md §6 "Platform detection").
pub fn detect_platform(task: Option<&str>, url: Option<&str>) -> Option<Platform> {
    let haystacks: Vec<String> = [task, url]
        .into_iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect();

    if haystacks.is_empty() {
        return None;
    }

    Platform::ALL.into_iter().find(|&platform| {
        let (name, domains) = platform.name_and_domains();
        haystacks.iter().any(|h| {
            h.contains(name) || domains.iter().any(|d| h.contains(d))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_domain() {
        assert_eq!(
            detect_platform(None, Some("https://www.instagram.com/explore/")),
            Some(Platform::Instagram)
        );
        assert_eq!(
            detect_platform(None, Some("https://x.com/home")),
            Some(Platform::Twitter)
        );
    }

    #[test]
    fn detects_by_task_name_case_insensitive() {
        assert_eq!(
            detect_platform(Some("scroll through LinkedIn feed"), None),
            Some(Platform::LinkedIn)
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(detect_platform(Some("check my email"), Some("https://mail.example.com")), None);
    }

    #[test]
    fn twitter_matches_legacy_domain_too() {
        assert_eq!(
            detect_platform(None, Some("https://twitter.com/i/bookmarks")),
            Some(Platform::Twitter)
        );
    }

    #[test]
    fn each_platform_has_nonempty_launch_flags() {
        for platform in Platform::ALL {
            assert!(!platform.launch_flags().is_empty());
        }
    }
}
