//! Fingerprint Generator (FG) — spec.md §3 `Fingerprint`, §4.5.
//!
//! A pure function: session-id (+ optional seed) → a stable `Fingerprint`.
//! Created once per session (on first request) and immutable thereafter,
//! matching the spec's "Created on first request for the session; immutable
//! thereafter." Determinism-given-seed (spec.md §8) is implemented by
//! hashing `seed` and `session_id` into a single `u64` and driving every
//! random choice from a seeded `rand::rngs::StdRng` — no wall-clock entropy
//! enters the picture unless no seed was requested, in which case we fold
//! in one call to `rand::random()` up front.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A fixed font catalogue; each name is included independently with
/// probability ≈0.9 (spec.md §3 `fonts`).
const CANDIDATE_FONTS: &[&str] = &[
    "Arial",
    "Arial Black",
    "Calibri",
    "Cambria",
    "Comic Sans MS",
    "Consolas",
    "Courier New",
    "Georgia",
    "Helvetica",
    "Impact",
    "Segoe UI",
    "Tahoma",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
];

const WEBGL_PROFILES: &[(&str, &str, &str)] = &[
    ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 620 Direct3D11 vs_5_0 ps_5_0)", "Intel Inc."),
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0)", "NVIDIA Corporation"),
    ("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 580 Series Direct3D11 vs_5_0 ps_5_0)", "ATI Technologies Inc."),
];

const HARDWARE_PROFILES: &[(u32, u32)] = &[(4, 8), (8, 16), (4, 16), (8, 8), (12, 16)];

const TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Los_Angeles",
    "Europe/London",
    "Europe/Berlin",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hardware {
    pub memory_gb: u32,
    pub cores: u32,
    pub platform: String,
    pub screen: Screen,
    pub timezone: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebGl {
    pub renderer: String,
    pub vendor: String,
    pub version: String,
    pub shading_language_version: String,
}

/// Noise magnitudes are stored as fixed-point millionths so the struct can
/// derive `PartialEq`/`Eq` (spec.md §8 determinism property needs exact
/// equality for tests); canvas noise ∈ [0, 0.01), audio noise ∈ [0, 0.001).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Canvas {
    pub noise_micros: u32,
}

impl Canvas {
    pub fn noise(&self) -> f64 {
        self.noise_micros as f64 / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Audio {
    pub sample_rate: u32,
    pub noise_micros: u32,
}

impl Audio {
    pub fn noise(&self) -> f64 {
        self.noise_micros as f64 / 1_000_000.0
    }
}

/// Default permission the spec names; `Prompt`/`Granted` are not reachable
/// from FG but are kept so the injector's `permissions.query` override can
/// round-trip any state a site later mutates into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Default,
    Denied,
    Prompt,
    Granted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permissions {
    pub notifications: PermissionState,
    pub geolocation: PermissionState,
    pub camera: PermissionState,
    pub microphone: PermissionState,
    pub persistent_storage: PermissionState,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            notifications: PermissionState::Default,
            geolocation: PermissionState::Denied,
            camera: PermissionState::Denied,
            microphone: PermissionState::Denied,
            persistent_storage: PermissionState::Denied,
        }
    }
}

/// One session's complete browser-exposed fingerprint (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub hardware: Hardware,
    pub webgl: WebGl,
    pub canvas: Canvas,
    pub audio: Audio,
    pub fonts: Vec<String>,
    pub permissions: Permissions,
}

fn fold_seed(seed: Option<u64>, session_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.unwrap_or_else(rand::random).hash(&mut hasher);
    session_id.hash(&mut hasher);
    hasher.finish()
}

/// Generate the `Fingerprint` for a session. Pure given `seed` (spec.md §8
/// "FG determinism-given-seed"): the same `(seed, session_id)` pair always
/// yields a bit-identical `Fingerprint`. When `seed` is `None`, one
/// process-random `u64` is folded in so unseeded callers still get
/// independent fingerprints per session.
pub fn generate(session_id: &str, seed: Option<u64>) -> Fingerprint {
    let mut rng = StdRng::seed_from_u64(fold_seed(seed, session_id));

    let (cores, memory_gb) = HARDWARE_PROFILES[rng.random_range(0..HARDWARE_PROFILES.len())];
    let (vendor, renderer, _driver_vendor) = WEBGL_PROFILES[rng.random_range(0..WEBGL_PROFILES.len())];
    let timezone = TIMEZONES[rng.random_range(0..TIMEZONES.len())];

    let fonts = CANDIDATE_FONTS
        .iter()
        .filter(|_| rng.random::<f64>() < 0.9)
        .map(|s| s.to_string())
        .collect();

    let chrome_version = 130 + rng.random_range(0..6u32);
    let user_agent = format!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{chrome_version}.0.0.0 Safari/537.36"
    );

    Fingerprint {
        user_agent,
        hardware: Hardware {
            memory_gb,
            cores,
            platform: "Win32".to_string(),
            screen: Screen {
                width: 1920,
                height: 1080,
                depth: 24,
            },
            timezone: timezone.to_string(),
            language: "en-US".to_string(),
        },
        webgl: WebGl {
            renderer: renderer.to_string(),
            vendor: vendor.to_string(),
            version: "WebGL 1.0 (OpenGL ES 2.0 Chromium)".to_string(),
            shading_language_version: "WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 Chromium)".to_string(),
        },
        canvas: Canvas {
            // [0, 0.01) => [0, 10_000) micros
            noise_micros: rng.random_range(0..10_000),
        },
        audio: Audio {
            sample_rate: 44_100,
            // [0, 0.001) => [0, 1_000) micros
            noise_micros: rng.random_range(0..1_000),
        },
        fonts,
        permissions: Permissions::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_given_seed() {
        let a = generate("session-1", Some(42));
        let b = generate("session-1", Some(42));
        assert_eq!(a, b);
    }

    #[test]
    fn differs_across_sessions_with_same_seed() {
        let a = generate("session-1", Some(42));
        let b = generate("session-2", Some(42));
        assert_ne!(a, b);
    }

    #[test]
    fn canvas_and_audio_noise_within_bounds() {
        for i in 0..50 {
            let fp = generate(&format!("s{i}"), Some(i));
            assert!(fp.canvas.noise() < 0.01);
            assert!(fp.audio.noise() < 0.001);
        }
    }

    #[test]
    fn permissions_match_spec_defaults() {
        let fp = generate("s", Some(1));
        assert_eq!(fp.permissions.notifications, PermissionState::Default);
        assert_eq!(fp.permissions.geolocation, PermissionState::Denied);
        assert_eq!(fp.permissions.camera, PermissionState::Denied);
        assert_eq!(fp.permissions.microphone, PermissionState::Denied);
        assert_eq!(fp.permissions.persistent_storage, PermissionState::Denied);
    }
}
