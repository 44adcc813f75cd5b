//! Session Lifecycle Manager (SLM) — spec.md §4.1.
//!
//! Grounded in the teacher's single-browser `BrowserManager` (`manager.rs`,
//! dropped this transformation) generalized from "one process-wide browser"
//! to "one `DashMap` of per-tenant sessions" — the concurrent-registry
//! pattern itself (insert/get/remove under no external lock, `Arc<Session>`
//! values) is the part worth keeping from that file.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::BrowserWrapper;
use crate::config::{FleetConfig, SessionOptions};
use crate::error::{SessionError, SessionResult};
use crate::fanout::{NoopFanout, SessionCleanupEvent, TabEventSink, TabSwitchedEvent};
use crate::stealth::fingerprint;
use crate::stealth::platform::detect_platform;
use crate::stream::{FrameSink, NullFrameSink};
use crate::tab::TabId;

use super::{ManualProtection, Session, SessionId, SessionStatus};

/// SUPPLEMENT (SPEC_FULL.md §4.1): minimal handle for an externally-owned
/// child process. `terminate()` requests graceful shutdown (SIGTERM);
/// returning `false` (or timing out by never resolving within the 5 s
/// escalation window used by [`SessionLifecycleManager::cleanup`]) causes
/// `kill()` (SIGKILL) to be invoked.
#[async_trait]
pub trait ChildAgentHandle: Send + Sync {
    async fn terminate(&self) -> bool;
    async fn kill(&self);
}

const IDLE_SCAN_INTERVAL: Duration = Duration::from_secs(30);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const CHILD_AGENT_ESCALATION: Duration = Duration::from_secs(5);
/// How long a cleaned-up session's entry is kept around for debugging
/// before being dropped from the registry (spec.md §4.1 step 6).
const CLEANUP_RETENTION: Duration = Duration::from_secs(5);

/// Creates, times out, and destroys sessions; enforces `max_concurrent` and
/// the idle/absolute timeouts (spec.md §4.1). One instance per process,
/// constructed at the entry point — not a `static` (spec.md §9).
pub struct SessionLifecycleManager {
    config: FleetConfig,
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Slots reserved by `create()` calls that have passed the capacity
    /// gate but may not have inserted into `sessions` yet (spec.md §8 "Cap
    /// enforcement"). Incremented atomically with the gate check itself so
    /// N+1 concurrent `create()` calls can't all observe room under the cap
    /// before any of them inserts; decremented on a failed launch (the slot
    /// was never used) and when a session is finally removed from the
    /// registry (`cleanup`'s retention-delay step).
    reserved: AtomicUsize,
    sink: Arc<dyn TabEventSink>,
    frame_sink: Arc<dyn FrameSink>,
}

impl SessionLifecycleManager {
    pub fn new(config: FleetConfig) -> Arc<Self> {
        Self::with_sinks(config, Arc::new(NoopFanout), Arc::new(NullFrameSink))
    }

    pub fn with_sinks(
        config: FleetConfig,
        sink: Arc<dyn TabEventSink>,
        frame_sink: Arc<dyn FrameSink>,
    ) -> Arc<Self> {
        let slm = Arc::new(Self {
            config,
            sessions: DashMap::new(),
            reserved: AtomicUsize::new(0),
            sink,
            frame_sink,
        });
        slm.clone().spawn_background_timers();
        slm
    }

    fn spawn_background_timers(self: Arc<Self>) {
        let idle = self.clone();
        tokio::spawn(async move { idle.idle_scanner_loop().await });
        let sweeper = self;
        tokio::spawn(async move { sweeper.main_sweeper_loop().await });
    }

    async fn idle_scanner_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(IDLE_SCAN_INTERVAL);
        loop {
            ticker.tick().await;
            self.scan_idle().await;
        }
    }

    /// spec.md §4.1 "Idle scanner": per-session idle/absolute timeout check.
    async fn scan_idle(self: &Arc<Self>) {
        let candidates: Vec<(SessionId, &'static str)> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let session = entry.value();
                if session.age() > session.options.session_timeout() {
                    Some((session.id.clone(), "absolute_timeout"))
                } else if session.idle_for() > session.options.max_idle() {
                    Some((session.id.clone(), "idle_timeout"))
                } else {
                    None
                }
            })
            .collect();

        for (id, reason) in candidates {
            self.schedule_cleanup(&id, reason).await;
        }
    }

    async fn main_sweeper_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            self.sweep_capacity().await;
        }
    }

    /// spec.md §4.1 "Main sweeper": trims the oldest sessions when the
    /// active count exceeds the cap by more than the 2-session hysteresis
    /// margin.
    async fn sweep_capacity(self: &Arc<Self>) {
        let active = self.sessions.len();
        let cap = self.config.max_concurrent;
        if active <= cap {
            return;
        }
        let mut by_age: Vec<(SessionId, Duration)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().age()))
            .collect();
        by_age.sort_by(|a, b| b.1.cmp(&a.1));

        let excess = active - cap + 2;
        for (id, _) in by_age.into_iter().take(excess) {
            self.schedule_cleanup(&id, "capacity_limit").await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    /// Atomically reserve one capacity slot, or fail with
    /// `CapacityExceeded` if none remain. Must be called (and must
    /// complete) before any `.await` point in `create()`'s caller so that
    /// concurrent callers serialize on the compare-exchange rather than on
    /// a subsequent, much longer await (spec.md §8 "Cap enforcement").
    fn try_reserve(&self) -> SessionResult<()> {
        loop {
            let current = self.reserved.load(Ordering::SeqCst);
            if current >= self.config.max_concurrent {
                return Err(SessionError::CapacityExceeded {
                    active: current,
                    max: self.config.max_concurrent,
                });
            }
            if self
                .reserved
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Release a slot taken by `try_reserve`: either the reserving
    /// `create()` call failed before inserting into `sessions`, or the
    /// session it created has just been removed from the registry.
    fn release_reservation(&self) {
        self.reserved.fetch_sub(1, Ordering::SeqCst);
    }

    /// spec.md §4.1 `create`. Allocates a browser with platform-specific
    /// launch flags, applies FG+SI to the initial tab, and spawns the
    /// session's tab-follow task.
    pub async fn create(self: &Arc<Self>, options: SessionOptions) -> SessionResult<Arc<Session>> {
        // Reserve a slot atomically with the capacity check itself: the
        // check-then-`insert` pattern left a window (the launch_browser
        // await, seconds long) during which N+1 concurrent callers could
        // all observe room under the cap. Reserving here, before any
        // `.await`, closes it (spec.md §8 "Cap enforcement").
        self.try_reserve()?;

        let id = Uuid::new_v4().to_string();
        let platform = detect_platform(options.task.as_deref(), None);

        let (browser, handler, user_data_dir) =
            match crate::browser::launch_browser(&id, &options, platform).await {
                Ok(v) => v,
                Err(err) => {
                    // Launch failed: the slot was never used, release it.
                    self.release_reservation();
                    return Err(SessionError::LaunchFailed(err.to_string()));
                }
            };
        let wrapper = BrowserWrapper::new(browser, handler, user_data_dir);

        let fingerprint = fingerprint::generate(&id, options.fingerprint_seed);
        let mut session = Session::new(id.clone(), options, fingerprint.clone(), platform);
        session.set_frame_sink(self.frame_sink.clone());
        let session = Arc::new(session);
        session.attach_browser(wrapper).await;

        self.inject_initial_tab(&session).await;

        {
            let mut inner = session.inner.lock().await;
            inner.status = SessionStatus::Active;
        }

        self.sessions.insert(id.clone(), session.clone());
        self.spawn_tab_follow(session.clone());

        info!(session_id = %id, platform = ?platform, "session created");
        Ok(session)
    }

    async fn inject_initial_tab(&self, session: &Arc<Session>) {
        let browser_guard = session.browser.lock().await;
        let Some(wrapper) = browser_guard.as_ref() else {
            return;
        };
        match crate::browser::create_blank_page(wrapper).await {
            Ok(page) => {
                let installed =
                    crate::stealth::injector::install(&page, &session.fingerprint, session.platform)
                        .await;
                debug!(session_id = %session.id, fragments = installed, "stealth injected into initial tab");
            }
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "failed to create initial blank page");
            }
        }
    }

    fn spawn_tab_follow(&self, session: Arc<Session>) {
        let sink = self.sink.clone();
        let for_handle = session.clone();
        let handle = tokio::spawn(async move {
            crate::tabfollow::run(session, sink).await;
        });
        for_handle.set_tfs_handle(handle);
    }

    pub fn touch(&self, id: &str) {
        if let Some(session) = self.get(id) {
            session.touch();
        }
    }

    /// Switch a session's active tab (spec.md §8 scenario 2 calls this
    /// `switch_to_tab(session, tab, manual=true)`). `manual=true` opens a
    /// `manual_protection_window` during which TFS may not override the
    /// choice (spec.md §4.2 gate 1); `manual=false` is the path TFS itself
    /// uses to commit an automatic switch.
    pub async fn switch_to_tab(self: &Arc<Self>, id: &str, tab_id: TabId, manual: bool) -> SessionResult<()> {
        let session = self.get(id).ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let page = self.find_page(&session, &tab_id).await?;

        let url = page.url().await.ok().flatten().unwrap_or_default();
        let title = page
            .evaluate("document.title")
            .await
            .ok()
            .and_then(|r| r.into_value::<String>().ok())
            .unwrap_or_default();

        {
            let mut inner = session.inner.lock().await;
            inner.tabs.upsert(tab_id.clone(), url.clone(), title.clone());
            inner.set_active_tab(Some(tab_id.clone()));
            if manual {
                inner.manual_protection = Some(ManualProtection {
                    tab_id: tab_id.clone(),
                    until: Instant::now() + session.options.manual_protection_window(),
                });
            }
        }

        if let Err(err) = page.bring_to_front().await {
            warn!(session_id = %id, tab_id = %tab_id, error = %err, "bring_to_front failed on switch_to_tab");
        }

        {
            let mut inner = session.inner.lock().await;
            if inner.streaming_enabled {
                if manual {
                    inner
                        .binder
                        .rebind_on_manual_switch(
                            id,
                            &tab_id,
                            page.clone(),
                            session.options.viewport,
                            session.options.stream_jpeg_quality,
                            session.frame_sink.clone(),
                        )
                        .await;
                } else {
                    inner
                        .binder
                        .bind(
                            id,
                            &tab_id,
                            page.clone(),
                            session.options.viewport,
                            session.options.stream_jpeg_quality,
                            session.frame_sink.clone(),
                        )
                        .await;
                }
            }
        }

        self.sink
            .emit_tab_switched(TabSwitchedEvent {
                session_id: id.to_string(),
                tab_id,
                url,
                title,
            })
            .await;
        self.sink.emit_tab_list(session.tab_list_event().await).await;

        Ok(())
    }

    /// Finds the live `Page` for `tab_id` by re-enumerating targets (spec.md
    /// §7 `TargetGone`: the tab may have closed between the caller's view of
    /// the tab list and this call).
    async fn find_page(&self, session: &Arc<Session>, tab_id: &str) -> SessionResult<Page> {
        let browser_guard = session.browser.lock().await;
        let wrapper = browser_guard
            .as_ref()
            .ok_or_else(|| SessionError::TargetGone(tab_id.to_string()))?;
        let pages = wrapper.browser().pages().await.map_err(SessionError::from)?;
        pages
            .into_iter()
            .find(|p| p.target_id().to_string() == tab_id)
            .ok_or_else(|| SessionError::TargetGone(tab_id.to_string()))
    }

    /// spec.md §4.1 `schedule_cleanup`. No-op if already scheduled.
    pub async fn schedule_cleanup(self: &Arc<Self>, id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let Some(session) = self.get(id) else {
            return;
        };

        {
            let mut inner = session.inner.lock().await;
            if inner.cleanup_scheduled {
                return;
            }
            inner.cleanup_scheduled = true;
            inner.cleanup_reason = Some(reason.clone());
        }

        let slm = self.clone();
        let id = id.to_string();
        let delay = session.options.cleanup_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            slm.cleanup(&id, reason).await;
        });
    }

    /// spec.md §4.1 `cleanup`. Idempotent; each step's errors are logged,
    /// never propagated, and never block the next step.
    pub async fn cleanup(self: &Arc<Self>, id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let Some(session) = self.get(id) else {
            // Already cleaned up and removed: cleanup(cleanup(s)) == cleanup(s).
            return;
        };

        {
            let mut inner = session.inner.lock().await;
            if inner.status == SessionStatus::CleanedUp {
                return;
            }
            inner.status = SessionStatus::CleaningUp;
        }

        // 1. terminate subordinate child agents.
        let agents = session.inner.lock().await.child_agents.clone();
        for agent in agents {
            if !agent.terminate().await {
                tokio::time::sleep(CHILD_AGENT_ESCALATION).await;
                agent.kill().await;
            }
        }

        // 2. stop stream binding.
        {
            let mut inner = session.inner.lock().await;
            inner.binder.unbind().await;
        }

        // 3. cancel periodic tasks (owned TFS tick).
        session.cancel_tfs().await;

        // 4. close browser. Failure does not block deletion (spec.md §4.1).
        if let Some(mut wrapper) = session.browser.lock().await.take() {
            wrapper.cleanup_temp_dir();
            // Dropping `wrapper` here aborts its handler task (BrowserWrapper::Drop).
        }

        // 5. notify socket room with a terminal event.
        self.sink
            .emit_session_cleanup(SessionCleanupEvent {
                session_id: id.to_string(),
                reason: reason.clone(),
                message: format!("session cleaned up: {reason}"),
            })
            .await;

        {
            let mut inner = session.inner.lock().await;
            inner.status = SessionStatus::CleanedUp;
        }
        info!(session_id = %id, reason = %reason, "session cleaned up");

        // 6. delete from registry after a retention grace (for debugging),
        // and release the capacity slot this session has held since its
        // `create()` reservation.
        let slm = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(CLEANUP_RETENTION).await;
            slm.sessions.remove(&id);
            slm.release_reservation();
        });
    }

    /// spec.md §4.1 `destroy_all`. Drains via `cleanup` over all sessions
    /// concurrently; final registry is empty once retention grace elapses.
    pub async fn destroy_all(self: &Arc<Self>) {
        let ids = self.list_sessions();
        let tasks = ids.iter().map(|id| self.cleanup(id, "shutdown"));
        futures::future::join_all(tasks).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockAgent {
        terminate_ok: bool,
        terminated: Arc<AtomicBool>,
        killed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChildAgentHandle for MockAgent {
        async fn terminate(&self) -> bool {
            self.terminated.store(true, Ordering::SeqCst);
            self.terminate_ok
        }

        async fn kill(&self) {
            self.killed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn capacity_exceeded_when_cap_is_zero() {
        let slm = SessionLifecycleManager::new(FleetConfig {
            max_concurrent: 0,
            ..FleetConfig::default()
        });
        let err = slm.create(SessionOptions::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::CapacityExceeded { active: 0, max: 0 }));
    }

    #[tokio::test]
    async fn concurrent_reservations_never_exceed_capacity() {
        // spec.md §8 "Cap enforcement": create() called N+1 times
        // concurrently yields exactly N reserved slots and one
        // CapacityExceeded. try_reserve is exercised directly here (rather
        // than through create()) so the test doesn't need a real browser.
        let slm = SessionLifecycleManager::new(FleetConfig {
            max_concurrent: 2,
            ..FleetConfig::default()
        });

        let results = futures::future::join_all((0..3).map(|_| {
            let slm = slm.clone();
            tokio::spawn(async move { slm.try_reserve() })
        }))
        .await;

        let ok_count = results
            .iter()
            .filter(|r| matches!(r, Ok(Ok(()))))
            .count();
        let err_count = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(SessionError::CapacityExceeded { .. }))))
            .count();
        assert_eq!(ok_count, 2);
        assert_eq!(err_count, 1);
        assert_eq!(slm.reserved.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cleanup_on_unknown_session_is_a_harmless_no_op() {
        let slm = SessionLifecycleManager::new(FleetConfig::default());
        slm.cleanup("does-not-exist", "test").await;
        assert_eq!(slm.active_count(), 0);
    }

    #[tokio::test]
    async fn terminate_failure_escalates_to_kill_immediately_in_test_timing() {
        let terminated = Arc::new(AtomicBool::new(false));
        let killed = Arc::new(AtomicUsize::new(0));
        let agent: Arc<dyn ChildAgentHandle> = Arc::new(MockAgent {
            terminate_ok: false,
            terminated: terminated.clone(),
            killed: killed.clone(),
        });
        assert!(!agent.terminate().await);
        agent.kill().await;
        assert!(terminated.load(Ordering::SeqCst));
        assert_eq!(killed.load(Ordering::SeqCst), 1);
    }
}
