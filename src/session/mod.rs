//! Session — spec.md §3 `Session`.
//!
//! One `Session` exclusively owns one browser instance and its tab graph.
//! The mutable core (`SessionInner`) sits behind a single `tokio::sync::Mutex`
//! so that TFS ticks, manual switches, and cleanup never interleave their
//! mutation of the tab registry or the stream binding (spec.md §5) — the
//! same "one mutex per mutable resource, CDP calls happen outside it"
//! pattern the teacher uses for its `Arc<Mutex<Option<BrowserWrapper>>>`
//! (`manager.rs`).

pub mod lifecycle;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserWrapper;
use crate::config::SessionOptions;
use crate::fanout::{AvailableTabsEvent, TabSummary};
use crate::stealth::{Fingerprint, Platform};
use crate::stream::{FrameSink, NullFrameSink, StreamBinder};
use crate::tab::{TabId, TabRegistry};

pub type SessionId = String;

/// spec.md §3 status state machine: monotonic, no reverse transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    CleaningUp,
    CleanedUp,
}

/// SUPPLEMENT (SPEC_FULL.md §3): a serde-serializable read-model of a
/// session, for an out-of-scope HTTP layer to expose without reaching into
/// `SessionInner` directly — grounded in the teacher's
/// `research/session.rs` `AgentSessionOutput` read-model pattern. `Instant`
/// fields are rendered as elapsed seconds since they have no meaningful
/// serialization otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub status: SessionStatus,
    pub age_secs: u64,
    pub idle_secs: u64,
    pub active_tab_id: Option<TabId>,
    pub tabs: Vec<TabSummary>,
    pub streaming_enabled: bool,
    pub platform: Option<Platform>,
}

/// A user-driven switch blocks automatic switching for
/// `manual_protection_window` (spec.md §3, §4.2 gate 1).
#[derive(Debug, Clone)]
pub struct ManualProtection {
    pub tab_id: TabId,
    pub until: Instant,
}

impl ManualProtection {
    pub fn is_active(&self) -> bool {
        Instant::now() < self.until
    }
}

/// The part of a session's state mutated under its single mutex (spec.md
/// §5). CDP calls and in-page evaluations happen *outside* this lock —
/// callers gather what they need, then take the lock only to read/commit.
pub struct SessionInner {
    pub status: SessionStatus,
    pub tabs: TabRegistry,
    pub active_tab_id: Option<TabId>,
    pub manual_protection: Option<ManualProtection>,
    pub streaming_enabled: bool,
    pub binder: StreamBinder,
    pub cleanup_scheduled: bool,
    pub cleanup_reason: Option<String>,
    /// SUPPLEMENT (SPEC_FULL.md §4.1): subordinate child agents terminated
    /// as cleanup step 1. The concrete LLM child-process agent is out of
    /// scope; this crate wires none in by default.
    pub child_agents: Vec<Arc<dyn lifecycle::ChildAgentHandle>>,
}

impl SessionInner {
    fn new(streaming_enabled: bool) -> Self {
        Self {
            status: SessionStatus::Created,
            tabs: TabRegistry::new(),
            active_tab_id: None,
            manual_protection: None,
            streaming_enabled,
            binder: StreamBinder::new(),
            cleanup_scheduled: false,
            cleanup_reason: None,
            child_agents: Vec::new(),
        }
    }

    /// spec.md §3 invariant: exactly one tab has `is_active=true` iff
    /// `active_tab_id` is set.
    pub fn set_active_tab(&mut self, tab_id: Option<TabId>) {
        self.tabs.set_active(tab_id.as_deref());
        self.active_tab_id = tab_id;
    }
}

/// One isolated browser+tab-graph+stream, owned by one tenant (spec.md §3).
pub struct Session {
    pub id: SessionId,
    pub created_at: Instant,
    pub options: SessionOptions,
    pub fingerprint: Fingerprint,
    pub platform: Option<Platform>,
    last_activity: SyncMutex<Instant>,
    /// Exclusively owned (spec.md §3): taken out by `cleanup()`, never
    /// shared. `None` once the browser has been torn down.
    pub browser: AsyncMutex<Option<BrowserWrapper>>,
    pub inner: AsyncMutex<SessionInner>,
    /// Cancelled on `cleanup()`; checked between CDP calls inside the TFS
    /// tick so an in-flight tick can be preempted (spec.md §5).
    pub cancellation: CancellationToken,
    pub frame_sink: Arc<dyn FrameSink>,
    /// Periodic tasks owned by the session, cancelled at shutdown (spec.md
    /// §3 `intervals`). Populated once the session becomes active.
    tfs_handle: SyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Session {
    /// Constructs a session shell with no browser attached yet (status
    /// `Created`). The lifecycle manager launches the browser and calls
    /// [`Session::attach_browser`] before marking the session `Active`.
    pub fn new(
        id: SessionId,
        options: SessionOptions,
        fingerprint: Fingerprint,
        platform: Option<Platform>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            fingerprint,
            platform,
            browser: AsyncMutex::new(None),
            inner: AsyncMutex::new(SessionInner::new(options.streaming_enabled)),
            options,
            last_activity: SyncMutex::new(now),
            cancellation: CancellationToken::new(),
            frame_sink: Arc::new(NullFrameSink),
            tfs_handle: SyncMutex::new(None),
        }
    }

    pub async fn attach_browser(&self, browser: BrowserWrapper) {
        *self.browser.lock().await = Some(browser);
    }

    pub fn set_frame_sink(&mut self, sink: Arc<dyn FrameSink>) {
        self.frame_sink = sink;
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn set_tfs_handle(&self, handle: tokio::task::JoinHandle<()>) {
        *self.tfs_handle.lock() = Some(handle);
    }

    /// Cancel and await the owned periodic task (spec.md §4.2 "session
    /// cleanup cancels it and waits for the in-flight tick to return").
    pub async fn cancel_tfs(&self) {
        self.cancellation.cancel();
        let handle = self.tfs_handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Snapshot of the tab registry as the `available-tabs` event (spec.md
    /// §6). Shared by `tabfollow` (after an automatic switch) and
    /// `SessionLifecycleManager::switch_to_tab` (after a manual one) so both
    /// paths broadcast an identical shape.
    pub async fn tab_list_event(&self) -> AvailableTabsEvent {
        let inner = self.inner.lock().await;
        let tabs = inner
            .tabs
            .list()
            .iter()
            .map(|tab| TabSummary {
                id: tab.id.clone(),
                title: tab.title.clone(),
                url: tab.url.clone(),
                active: tab.is_active,
            })
            .collect();
        AvailableTabsEvent {
            session_id: self.id.clone(),
            tabs,
            active_tab_id: inner.active_tab_id.clone(),
        }
    }

    /// SUPPLEMENT (SPEC_FULL.md §3): a point-in-time, serializable view of
    /// this session for a host process's status/introspection surface.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let tabs = inner
            .tabs
            .list()
            .iter()
            .map(|tab| TabSummary {
                id: tab.id.clone(),
                title: tab.title.clone(),
                url: tab.url.clone(),
                active: tab.is_active,
            })
            .collect();
        SessionSnapshot {
            id: self.id.clone(),
            status: inner.status,
            age_secs: self.age().as_secs(),
            idle_secs: self.idle_for().as_secs(),
            active_tab_id: inner.active_tab_id.clone(),
            tabs,
            streaming_enabled: inner.streaming_enabled,
            platform: self.platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::fingerprint;

    fn make_session() -> Session {
        let fp = fingerprint::generate("s1", Some(1));
        Session::new("s1".to_string(), SessionOptions::default(), fp, None)
    }

    #[test]
    fn new_session_has_no_active_tab() {
        let session = make_session();
        let inner = session.inner.try_lock().unwrap();
        assert!(inner.active_tab_id.is_none());
        assert_eq!(inner.status, SessionStatus::Created);
    }

    #[test]
    fn touch_resets_idle_timer() {
        let session = make_session();
        std::thread::sleep(Duration::from_millis(5));
        assert!(session.idle_for() >= Duration::from_millis(5));
        session.touch();
        assert!(session.idle_for() < Duration::from_millis(5));
    }

    #[test]
    fn manual_protection_expires() {
        let mp = ManualProtection {
            tab_id: "t1".to_string(),
            until: Instant::now() - Duration::from_secs(1),
        };
        assert!(!mp.is_active());
    }

    #[test]
    fn set_active_tab_updates_registry_and_field() {
        let session = make_session();
        let mut inner = session.inner.try_lock().unwrap();
        inner.tabs.upsert("a".to_string(), "https://a.example", "A");
        inner.tabs.upsert("b".to_string(), "https://b.example", "B");
        inner.set_active_tab(Some("a".to_string()));
        assert!(inner.tabs.get("a").unwrap().is_active);
        assert!(!inner.tabs.get("b").unwrap().is_active);
        assert_eq!(inner.active_tab_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn snapshot_reflects_active_tab_and_status() {
        let session = make_session();
        {
            let mut inner = session.inner.lock().await;
            inner.status = SessionStatus::Active;
            inner.tabs.upsert("a".to_string(), "https://a.example", "A");
            inner.set_active_tab(Some("a".to_string()));
        }
        let snap = session.snapshot().await;
        assert_eq!(snap.status, SessionStatus::Active);
        assert_eq!(snap.active_tab_id.as_deref(), Some("a"));
        assert_eq!(snap.tabs.len(), 1);
        assert!(snap.tabs[0].active);

        let json = serde_json::to_string(&snap).expect("snapshot must serialize");
        assert!(json.contains("\"active\""));
    }
}
