//! Configuration inputs (spec.md §6).
//!
//! All fields are optional with the defaults named in the spec. Follows the
//! teacher's `Config`/`BrowserConfig`/`WindowConfig` shape: a small tree of
//! `Deserialize` structs with per-field `#[serde(default = "...")]` functions
//! rather than a single `impl Default` blob, so each default is individually
//! documented and testable.
//!
//! Loading this from a file or environment is out of scope for this crate
//! (spec.md §1); callers construct it directly or via `Default`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
    #[serde(default = "default_viewport_width")]
    pub width: u32,
    #[serde(default = "default_viewport_height")]
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: default_viewport_width(),
            height: default_viewport_height(),
        }
    }
}

/// Per-session tunables (spec.md §3 `options`, §6 configuration inputs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    #[serde(default = "default_auto_close")]
    pub auto_close: bool,

    #[serde(default)]
    pub viewport: Viewport,

    #[serde(default = "default_stealth_enabled")]
    pub stealth_enabled: bool,

    /// spec.md §3 `streaming.enabled` — independent of `stealth_enabled`:
    /// a session can run the stealth/fingerprint layer without a live
    /// screencast, or vice versa.
    #[serde(default = "default_streaming_enabled")]
    pub streaming_enabled: bool,

    #[serde(default = "default_manual_protection_secs")]
    pub manual_protection_secs: u64,

    #[serde(default = "default_tab_scan_interval_ms")]
    pub tab_scan_interval_ms: u64,

    #[serde(default = "default_cleanup_delay_secs")]
    pub cleanup_delay_secs: u64,

    #[serde(default = "default_stream_jpeg_quality")]
    pub stream_jpeg_quality: u8,

    /// When set, seeds the session's `Fingerprint` deterministically
    /// (spec.md §8 FG determinism-given-seed property).
    #[serde(default)]
    pub fingerprint_seed: Option<u64>,

    /// Free-text task description used for platform detection (spec.md §6).
    #[serde(default)]
    pub task: Option<String>,
}

impl SessionOptions {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn manual_protection_window(&self) -> Duration {
        Duration::from_secs(self.manual_protection_secs)
    }

    pub fn tab_scan_interval(&self) -> Duration {
        Duration::from_millis(self.tab_scan_interval_ms)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            max_idle_secs: default_max_idle_secs(),
            auto_close: default_auto_close(),
            viewport: Viewport::default(),
            stealth_enabled: default_stealth_enabled(),
            streaming_enabled: default_streaming_enabled(),
            manual_protection_secs: default_manual_protection_secs(),
            tab_scan_interval_ms: default_tab_scan_interval_ms(),
            cleanup_delay_secs: default_cleanup_delay_secs(),
            stream_jpeg_quality: default_stream_jpeg_quality(),
            fingerprint_seed: None,
            task: None,
        }
    }
}

/// Process-wide tunables that are not per-session (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default)]
    pub default_session: SessionOptions,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_session: SessionOptions::default(),
        }
    }
}

fn default_viewport_width() -> u32 {
    1920
}
fn default_viewport_height() -> u32 {
    1080
}
fn default_session_timeout_secs() -> u64 {
    30 * 60
}
fn default_max_idle_secs() -> u64 {
    10 * 60
}
fn default_auto_close() -> bool {
    true
}
fn default_stealth_enabled() -> bool {
    true
}
fn default_streaming_enabled() -> bool {
    true
}
fn default_manual_protection_secs() -> u64 {
    5
}
fn default_tab_scan_interval_ms() -> u64 {
    2_500
}
fn default_cleanup_delay_secs() -> u64 {
    2 * 60
}
fn default_stream_jpeg_quality() -> u8 {
    95
}
fn default_max_concurrent() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = SessionOptions::default();
        assert_eq!(opts.viewport.width, 1920);
        assert_eq!(opts.viewport.height, 1080);
        assert_eq!(opts.session_timeout_secs, 1800);
        assert_eq!(opts.max_idle_secs, 600);
        assert_eq!(opts.manual_protection_secs, 5);
        assert_eq!(opts.tab_scan_interval_ms, 2_500);
        assert_eq!(opts.cleanup_delay_secs, 120);
        assert_eq!(opts.stream_jpeg_quality, 95);
        assert!(opts.stealth_enabled);
        assert!(opts.streaming_enabled);

        let fleet = FleetConfig::default();
        assert_eq!(fleet.max_concurrent, 10);
    }

    #[test]
    fn viewport_clamped_default_is_1080p() {
        let v = Viewport::default();
        assert!(v.width <= 1920 && v.height <= 1080);
    }
}
