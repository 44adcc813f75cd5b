//! Stealth Injector (SI) — spec.md §4.5.
//!
//! Composes one `evaluateOnNewDocument` script from an ordered list of
//! named fragments, grounded in citescrape's `kromekover::inject`
//! `EVASION_SCRIPTS` ordering (proxy/core utils → CDP evasion → navigator.*
//! → hardware/UA → canvas/webgl/font → chrome.*). Unlike the teacher, whose
//! fragments live as files under `src/kromekover/evasions/`, this crate's
//! fragments are parameterized by a per-session `Fingerprint` and so are
//! built as `&str` templates rendered with `format!` rather than read off
//! disk — there is no per-session content to store a file for.

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use tracing::{debug, warn};

use super::activity::ACTIVITY_TRACKER_SCRIPT;
use super::fingerprint::Fingerprint;
use super::platform::Platform;

/// Automation markers removed outright (spec.md §4.5: "Deletes a fixed list
/// of known automation properties").
const DELETED_PROPERTIES: &[&str] = &[
    "webdriver",
    "__webdriver_evaluate",
    "__selenium_evaluate",
    "__webdriver_script_function",
    "__webdriver_script_func",
    "__webdriver_script_fn",
    "__fxdriver_evaluate",
    "__driver_unwrapped",
    "__webdriver_unwrapped",
    "__driver_evaluate",
    "__selenium_unwrapped",
    "__fxdriver_unwrapped",
    "_Selenium_IDE_Recorder",
    "_selenium",
    "calledSelenium",
    "_browserUse",
    "__browserUse",
    "__browserUseActivityInstalled",
];

fn navigator_webdriver_fragment() -> String {
    let deletes: String = DELETED_PROPERTIES
        .iter()
        .map(|p| format!("try {{ delete window.{p}; delete navigator.{p}; }} catch (e) {{}}\n"))
        .collect();
    format!(
        r#"
(() => {{
  Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined, configurable: true }});
  const originalHasOwnProperty = Object.prototype.hasOwnProperty;
  Object.prototype.hasOwnProperty = function (prop) {{
    if (prop === 'webdriver') return false;
    return originalHasOwnProperty.call(this, prop);
  }};
  {deletes}
}})();
"#
    )
}

fn navigator_properties_fragment(fp: &Fingerprint) -> String {
    let languages = format!(
        "[{}]",
        std::iter::once(&fp.hardware.language)
            .map(|l| format!("\"{l}\""))
            .collect::<Vec<_>>()
            .join(", ")
    );
    format!(
        r#"
(() => {{
  const define = (obj, prop, value) => Object.defineProperty(obj, prop, {{ get: () => value, configurable: true }});
  define(navigator, 'hardwareConcurrency', {cores});
  define(navigator, 'deviceMemory', {memory_gb});
  define(navigator, 'platform', "{platform}");
  define(navigator, 'language', "{language}");
  define(navigator, 'languages', Object.freeze({languages}));
  define(navigator, 'plugins', Object.freeze([
    {{ name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' }},
    {{ name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' }},
    {{ name: 'Native Client', filename: 'internal-nacl-plugin' }},
  ]));
  const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
  if (originalQuery) {{
    window.navigator.permissions.query = (parameters) => {{
      const states = {{
        notifications: "{perm_notifications}",
        geolocation: "{perm_geolocation}",
        camera: "{perm_camera}",
        microphone: "{perm_microphone}",
        "persistent-storage": "{perm_persistent_storage}",
      }};
      const state = states[parameters.name];
      if (state) return Promise.resolve({{ state, onchange: null }});
      return originalQuery(parameters);
    }};
  }}
}})();
"#,
        cores = fp.hardware.cores,
        memory_gb = fp.hardware.memory_gb,
        platform = fp.hardware.platform,
        language = fp.hardware.language,
        languages = languages,
        perm_notifications = permission_js(fp.permissions.notifications),
        perm_geolocation = permission_js(fp.permissions.geolocation),
        perm_camera = permission_js(fp.permissions.camera),
        perm_microphone = permission_js(fp.permissions.microphone),
        perm_persistent_storage = permission_js(fp.permissions.persistent_storage),
    )
}

fn permission_js(state: super::fingerprint::PermissionState) -> &'static str {
    use super::fingerprint::PermissionState::*;
    match state {
        Default => "prompt",
        Denied => "denied",
        Prompt => "prompt",
        Granted => "granted",
    }
}

fn chrome_runtime_fragment() -> &'static str {
    r#"
(() => {
  if (!window.chrome) window.chrome = {};
  window.chrome.runtime = {
    id: undefined,
    connect: () => ({ onMessage: { addListener: () => {} }, postMessage: () => {} }),
    sendMessage: () => {},
    onMessage: { addListener: () => {} },
  };
  window.chrome.loadTimes = () => ({});
  window.chrome.csi = () => ({});
})();
"#
}

fn hardware_fingerprint_fragment(fp: &Fingerprint) -> String {
    format!(
        r#"
(() => {{
  const define = (obj, prop, value) => Object.defineProperty(obj, prop, {{ get: () => value, configurable: true }});
  const jitter = (base) => base + (Math.random() > 0.5 ? 1 : -1) * Math.floor(Math.random() * 2);
  define(screen, 'width', jitter({width}));
  define(screen, 'height', jitter({height}));
  define(screen, 'colorDepth', {depth});
  define(screen, 'pixelDepth', {depth});
}})();
"#,
        width = fp.hardware.screen.width,
        height = fp.hardware.screen.height,
        depth = fp.hardware.screen.depth,
    )
}

fn webgl_fragment(fp: &Fingerprint) -> String {
    format!(
        r#"
(() => {{
  const RENDERER = "{renderer}";
  const VENDOR = "{vendor}";
  const VERSION = "{version}";
  const SHADING = "{shading}";
  const patch = (proto) => {{
    const orig = proto.getParameter;
    proto.getParameter = function (param) {{
      if (param === 37445) return VENDOR;
      if (param === 37446) return RENDERER;
      if (param === 7938) return VERSION;
      if (param === 35724) return SHADING;
      return orig.call(this, param);
    }};
  }};
  if (window.WebGLRenderingContext) patch(WebGLRenderingContext.prototype);
  if (window.WebGL2RenderingContext) patch(WebGL2RenderingContext.prototype);
}})();
"#,
        renderer = fp.webgl.renderer,
        vendor = fp.webgl.vendor,
        version = fp.webgl.version,
        shading = fp.webgl.shading_language_version,
    )
}

fn canvas_noise_fragment(fp: &Fingerprint) -> String {
    format!(
        r#"
(() => {{
  const NOISE_RATE = {noise_rate};
  const original = HTMLCanvasElement.prototype.toDataURL;
  HTMLCanvasElement.prototype.toDataURL = function (...args) {{
    const result = original.apply(this, args);
    if (Math.random() < NOISE_RATE) {{
      const chars = result.split('');
      const last = chars.length - 1;
      chars[last] = chars[last] === 'A' ? 'B' : 'A';
      return chars.join('');
    }}
    return result;
  }};
}})();
"#,
        noise_rate = fp.canvas.noise().max(0.1),
    )
}

fn audio_fragment(fp: &Fingerprint) -> String {
    format!(
        r#"
(() => {{
  const BASE = {sample_rate};
  const NOISE = {noise};
  for (const name of ['AudioContext', 'webkitAudioContext']) {{
    const Original = window[name];
    if (!Original) continue;
    window[name] = new Proxy(Original, {{
      construct(target, args) {{
        const instance = new target(...args);
        Object.defineProperty(instance, 'sampleRate', {{
          get: () => BASE + (Math.random() - 0.5) * NOISE,
          configurable: true,
        }});
        return instance;
      }},
    }});
  }}
}})();
"#,
        sample_rate = fp.audio.sample_rate,
        noise = fp.audio.noise(),
    )
}

fn query_selector_filter_fragment() -> &'static str {
    r#"
(() => {
  const BLOCKED = ["webdriver", "automation", "selenium", "browser-use"];
  const isBlocked = (selector) => typeof selector === 'string' && BLOCKED.some((b) => selector.toLowerCase().includes(b));
  const originalQS = Document.prototype.querySelector;
  Document.prototype.querySelector = function (selector) {
    if (isBlocked(selector)) return null;
    return originalQS.call(this, selector);
  };
  const originalQSA = Document.prototype.querySelectorAll;
  Document.prototype.querySelectorAll = function (selector) {
    if (isBlocked(selector)) return [];
    return originalQSA.call(this, selector);
  };
})();
"#
}

/// Platform-specific script installed after the generic fragments (spec.md
/// §4.5: "additionally installs platform-specific scripts").
fn platform_fragment(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::Instagram => Some(
            r#"
(() => {
  const originalFetch = window.fetch;
  window.fetch = function (input, init) {
    const url = typeof input === 'string' ? input : (input && input.url) || '';
    if (url.includes('instagram.com')) {
      init = init || {};
      init.headers = Object.assign({}, init.headers, { 'X-IG-App-ID': '936619743392459' });
    }
    return originalFetch.call(this, input, init);
  };
})();
"#,
        ),
        Platform::LinkedIn => Some(
            r#"
(() => {
  const style = document.createElement('style');
  style.textContent = '[data-test-id*="bot"], .automation-banner { display: none !important; }';
  (document.head || document.documentElement).appendChild(style);
})();
"#,
        ),
        _ => None,
    }
}

/// One named fragment plus its rendered source, so a failure to parse/run
/// can be logged by name (spec.md §7 InjectionFailure: "logged at debug,
/// session continues").
struct Fragment {
    name: &'static str,
    source: String,
}

fn build_fragments(fp: &Fingerprint, platform: Option<Platform>) -> Vec<Fragment> {
    let mut fragments = vec![
        Fragment { name: "cdp_evasion", source: navigator_webdriver_fragment() },
        Fragment { name: "navigator_properties", source: navigator_properties_fragment(fp) },
        Fragment { name: "hardware_fingerprint", source: hardware_fingerprint_fragment(fp) },
        Fragment { name: "webgl_override", source: webgl_fragment(fp) },
        Fragment { name: "canvas_noise", source: canvas_noise_fragment(fp) },
        Fragment { name: "audio_noise", source: audio_fragment(fp) },
        Fragment { name: "query_selector_filter", source: query_selector_filter_fragment().to_string() },
        Fragment { name: "chrome_runtime", source: chrome_runtime_fragment().to_string() },
        Fragment { name: "activity_tracker", source: ACTIVITY_TRACKER_SCRIPT.to_string() },
    ];

    if let Some(platform) = platform
        && let Some(source) = platform_fragment(platform)
    {
        fragments.push(Fragment {
            name: "platform_specific",
            source: source.to_string(),
        });
    }

    fragments
}

/// Install the full stealth + activity-tracker script on `page` (spec.md
/// §4.5). Best-effort per fragment: one fragment failing to inject is
/// logged and skipped, not fatal to the whole call (spec.md §7).
///
/// Returns the number of fragments that injected successfully; callers
/// treat zero successes as `InjectionFailure` (spec.md §7), matching
/// `kromekover::inject`'s "fail only if ZERO scripts were injected" policy.
pub async fn install(page: &Page, fingerprint: &Fingerprint, platform: Option<Platform>) -> usize {
    let fragments = build_fragments(fingerprint, platform);
    let mut success = 0usize;

    for fragment in fragments {
        let result = page
            .execute(AddScriptToEvaluateOnNewDocumentParams {
                source: fragment.source,
                include_command_line_api: None,
                world_name: None,
                run_immediately: None,
            })
            .await;

        match result {
            Ok(_) => {
                debug!(fragment = fragment.name, "stealth fragment injected");
                success += 1;
            }
            Err(err) => {
                warn!(fragment = fragment.name, error = %err, "stealth fragment failed to inject");
            }
        }
    }

    if let Err(err) = page
        .execute(SetUserAgentOverrideParams {
            user_agent: fingerprint.user_agent.clone(),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            platform: Some(fingerprint.hardware.platform.clone()),
            user_agent_metadata: None,
        })
        .await
    {
        warn!(error = %err, "failed to override user agent");
    }

    success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::fingerprint;

    #[test]
    fn builds_one_fragment_per_concern_plus_activity_tracker() {
        let fp = fingerprint::generate("s", Some(1));
        let fragments = build_fragments(&fp, None);
        assert_eq!(fragments.len(), 9);
        assert!(fragments.iter().any(|f| f.name == "activity_tracker"));
    }

    #[test]
    fn platform_fragment_appended_when_recognized() {
        let fp = fingerprint::generate("s", Some(1));
        let fragments = build_fragments(&fp, Some(Platform::Instagram));
        assert_eq!(fragments.len(), 10);
        assert!(fragments.iter().any(|f| f.name == "platform_specific"));
    }

    #[test]
    fn no_fragment_source_is_empty() {
        let fp = fingerprint::generate("s", Some(7));
        for fragment in build_fragments(&fp, Some(Platform::LinkedIn)) {
            assert!(!fragment.source.trim().is_empty(), "{} was empty", fragment.name);
        }
    }
}
