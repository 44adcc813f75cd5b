//! Socket Fan-out (SF) — spec.md §4.6, §6.
//!
//! The actual WebSocket/Socket.IO transport is out of scope (spec.md §1:
//! "the HTTP/WebSocket API surface"); this crate only defines the event
//! shapes and the trait TFS/SLM call into, grounded in the teacher's
//! `ShutdownHook`-style thin trait seam (`lib.rs`) that lets an external
//! transport be wired in without this crate depending on it.
//!
//! Delivery is best-effort: a `TabEventSink` impl that drops messages on
//! backpressure satisfies the contract (spec.md §4.6: "dropped messages are
//! not retried").

use async_trait::async_trait;
use serde::Serialize;

use crate::tab::TabId;

/// `available-tabs` event (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct AvailableTabsEvent {
    pub session_id: String,
    pub tabs: Vec<TabSummary>,
    pub active_tab_id: Option<TabId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TabSummary {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub active: bool,
}

/// `tab-switched` event (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct TabSwitchedEvent {
    pub session_id: String,
    pub tab_id: TabId,
    pub url: String,
    pub title: String,
}

/// `session-cleanup` event (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct SessionCleanupEvent {
    pub session_id: String,
    pub reason: String,
    pub message: String,
}

/// The room-keyed fan-out seam (spec.md §4.6, §2 item 8). One session maps
/// to one room, keyed by `session_id`.
#[async_trait]
pub trait TabEventSink: Send + Sync {
    async fn emit_tab_list(&self, event: AvailableTabsEvent);
    async fn emit_tab_switched(&self, event: TabSwitchedEvent);
    async fn emit_session_cleanup(&self, event: SessionCleanupEvent);
}

/// Default sink: logs and drops. Used when no external transport is wired
/// in (e.g. this crate's own binary, and unit tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFanout;

#[async_trait]
impl TabEventSink for NoopFanout {
    async fn emit_tab_list(&self, event: AvailableTabsEvent) {
        tracing::debug!(session_id = %event.session_id, tabs = event.tabs.len(), "available-tabs (no sink wired)");
    }

    async fn emit_tab_switched(&self, event: TabSwitchedEvent) {
        tracing::debug!(session_id = %event.session_id, tab_id = %event.tab_id, "tab-switched (no sink wired)");
    }

    async fn emit_session_cleanup(&self, event: SessionCleanupEvent) {
        tracing::debug!(session_id = %event.session_id, reason = %event.reason, "session-cleanup (no sink wired)");
    }
}
