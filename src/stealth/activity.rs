//! Automation-Activity Scorer (ATS, in-page) — spec.md §4.4.
//!
//! The companion on-new-document script records activity timestamps into
//! page-globals; a second, tiny snapshot script (evaluated on demand by
//! TFS) reads them back into one JSON object. Both are plain JS string
//! constants injected the same way the teacher's `kromekover::inject`
//! injects its evasion fragments — `AddScriptToEvaluateOnNewDocumentParams`
//! for the tracker, `Page::evaluate` for the snapshot.

use serde::{Deserialize, Serialize};

/// Installed once per page at document-start. Sets up the page-globals and
/// listeners spec.md §4.4 names: three timestamps, two booleans, mouse/
/// keyboard/form listeners, a MutationObserver, and a visibility listener.
pub const ACTIVITY_TRACKER_SCRIPT: &str = r#"
(() => {
  if (window.__browserUseActivityInstalled) return;
  window.__browserUseActivityInstalled = true;

  const now = () => Date.now();

  window.browserUseLastAction = now();
  window.lastInteractionTime = now();
  window.lastDomModification = now();
  window.lastVisibilityChange = now();
  window.browserUseActive = true;
  window.automationInProgress = true;

  const touchInteraction = () => {
    window.lastInteractionTime = now();
    window.browserUseLastAction = now();
  };

  const mouseEvents = ["click", "mousedown", "mouseup", "mousemove", "wheel"];
  const keyboardEvents = ["keydown", "keyup", "keypress", "input"];
  const formEvents = ["change", "select", "focus", "blur", "submit"];

  for (const type of mouseEvents) {
    document.addEventListener(type, touchInteraction, { capture: true, passive: true });
  }
  for (const type of keyboardEvents) {
    document.addEventListener(type, touchInteraction, { capture: true, passive: true });
  }
  for (const type of formEvents) {
    document.addEventListener(type, touchInteraction, { capture: true, passive: true });
  }

  const watchedAttributes = new Set([
    "class", "style", "value", "data-testid", "aria-label", "checked", "selected",
  ]);

  const observer = new MutationObserver((mutations) => {
    for (const mutation of mutations) {
      if (mutation.type === "attributes" && watchedAttributes.has(mutation.attributeName)) {
        window.lastDomModification = now();
        return;
      }
      if (mutation.type === "childList" && mutation.addedNodes.length > 0) {
        window.lastDomModification = now();
        return;
      }
      if (mutation.type === "characterData") {
        window.lastDomModification = now();
        return;
      }
    }
  });

  const startObserving = () => {
    observer.observe(document.documentElement || document, {
      attributes: true,
      attributeFilter: Array.from(watchedAttributes),
      childList: true,
      subtree: true,
      characterData: true,
    });
  };

  if (document.documentElement) {
    startObserving();
  } else {
    document.addEventListener("DOMContentLoaded", startObserving, { once: true });
  }

  document.addEventListener("visibilitychange", () => {
    window.lastVisibilityChange = now();
  });
})();
"#;

/// Evaluated on demand (spec.md §4.4: "snapshot returned by a single
/// in-page evaluation"). Must complete fast — TFS wraps the call in a
/// bounded timeout and treats overrun as "no activity" (spec.md §4.4
/// contract, §5 tick budget).
pub const ACTIVITY_SNAPSHOT_SCRIPT: &str = r#"
(() => {
  const now = Date.now();
  const last = (v) => (typeof v === "number" ? v : 0);
  const active = document.activeElement;
  const tag = active && active.tagName ? active.tagName.toLowerCase() : "";
  const hasInputFocus = ["input", "textarea", "select"].includes(tag);
  const isActiveElement = !!active && active !== document.body;

  let hasFormActivity = false;
  const forms = document.forms || [];
  for (const form of forms) {
    for (const el of form.elements) {
      if (el.value && String(el.value).length > 0) {
        hasFormActivity = true;
        break;
      }
    }
    if (hasFormActivity) break;
  }

  const browserUseLastAction = last(window.browserUseLastAction);
  const lastInteractionTime = last(window.lastInteractionTime);
  const lastDomModification = last(window.lastDomModification);
  const lastActivityTime = Math.max(browserUseLastAction, lastInteractionTime, lastDomModification);

  return {
    browserUseLastAction,
    lastInteractionTime,
    lastDomModification,
    lastVisibilityChange: last(window.lastVisibilityChange),
    browserUseActive: !!window.browserUseActive,
    automationInProgress: !!window.automationInProgress,
    lastActivityTime,
    timeSinceLastActivity: now - lastActivityTime,
    isVisible: document.visibilityState === "visible",
    hasFocus: document.hasFocus(),
    isActiveElement,
    hasInputFocus,
    isLoading: document.readyState === "loading",
    hasFormActivity,
    hasAutomationMarkers: !!(document.querySelector("[data-browser-use]") || document.querySelector(".browser-use-target")),
  };
})()
"#;

/// Rust-side mirror of the JSON object `ACTIVITY_SNAPSHOT_SCRIPT` returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySnapshot {
    pub browser_use_last_action: i64,
    pub last_interaction_time: i64,
    pub last_dom_modification: i64,
    pub last_visibility_change: i64,
    pub browser_use_active: bool,
    pub automation_in_progress: bool,
    pub last_activity_time: i64,
    pub time_since_last_activity: i64,
    pub is_visible: bool,
    pub has_focus: bool,
    pub is_active_element: bool,
    pub has_input_focus: bool,
    pub is_loading: bool,
    pub has_form_activity: bool,
    pub has_automation_markers: bool,
}

impl ActivitySnapshot {
    /// "No activity" fallback used when the in-page evaluation fails or
    /// overruns its bound (spec.md §4.4 contract).
    pub fn no_activity() -> Self {
        Self {
            time_since_last_activity: i64::MAX,
            ..Default::default()
        }
    }

    pub fn within(&self, window_ms: i64) -> bool {
        self.time_since_last_activity >= 0 && self.time_since_last_activity <= window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_activity_is_never_within_any_window() {
        let snap = ActivitySnapshot::no_activity();
        assert!(!snap.within(3_000));
        assert!(!snap.within(30_000));
    }

    #[test]
    fn recent_activity_is_within_window() {
        let snap = ActivitySnapshot {
            time_since_last_activity: 1_000,
            ..Default::default()
        };
        assert!(snap.within(3_000));
        assert!(!snap.within(500));
    }
}
