//! Tab Registry (TR) — spec.md §3 `Tab`, §4.6.
//!
//! A `Tab` is owned by its `Session`; the registry that holds them is a
//! plain data structure with no internal locking of its own — spec.md §5
//! puts TR mutation exclusively behind the session's own mutex, so adding a
//! second lock here would just invite the two to get out of sync.

mod registry;

pub use registry::TabRegistry;

use std::time::Instant;

/// The browser's own target id, reused verbatim as the tab id (spec.md §3:
/// "the browser's target id").
pub type TabId = String;

/// One entry in a session's tab graph (spec.md §3 `Tab`).
#[derive(Debug, Clone)]
pub struct Tab {
    pub id: TabId,
    /// Best-known title; eventually consistent with reality.
    pub title: String,
    /// Best-known URL; eventually consistent with reality.
    pub url: String,
    pub created_at: Instant,
    /// Advances on url change and on successful selection (spec.md §3).
    pub last_active_at: Instant,
    pub is_active: bool,
}

impl Tab {
    pub fn new(id: TabId, url: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            title: title.into(),
            url: url.into(),
            created_at: now,
            last_active_at: now,
            is_active: false,
        }
    }

    /// Filter predicate from spec.md §4.2 step 3: empty, `about:blank`, or
    /// an internal scheme. Such tabs remain in TR as candidates but score
    /// 0 or less — they are never removed here, only scored down.
    pub fn is_internal_scheme(&self) -> bool {
        self.url.is_empty()
            || self.url == "about:blank"
            || self.url.starts_with("chrome:")
            || self.url.starts_with("chrome-extension:")
    }

    pub fn is_http(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}
