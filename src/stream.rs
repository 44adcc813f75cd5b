//! Stream Binder (SB) — spec.md §4.3.
//!
//! Maintains at most one live CDP screencast per session, bound to exactly
//! one tab, with atomic-replace semantics on rebind. Grounded in the
//! teacher's `BrowserWrapper`/handler-task pattern (`browser/wrapper.rs`):
//! a binding owns a background task (here, the frame-event pump) that MUST
//! be aborted before the binding itself is considered torn down.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::dom::EnableParams as DomEnableParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EnableParams as PageEnableParams, EventScreencastFrame,
    ScreencastFrameAckParams, StartScreencastParams, StopScreencastParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EnableParams as RuntimeEnableParams;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Viewport;
use crate::error::{SessionError, SessionResult};
use crate::tab::TabId;

/// Receives decoded JPEG frames. Implementations MUST NOT block — spec.md
/// §5 backpressure: "screencast frames are dropped at the binder — JPEGs
/// are not queued," so the push itself has to be the drop point, not
/// something downstream of it.
pub trait FrameSink: Send + Sync {
    /// Returns `false` if the frame was dropped (e.g. a full bounded
    /// channel); the binder logs but otherwise ignores drops.
    fn push_frame(&self, session_id: &str, tab_id: &TabId, data: &[u8]) -> bool;
}

/// Discards every frame. Used when a session has no attached consumer yet,
/// and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn push_frame(&self, _session_id: &str, _tab_id: &TabId, _data: &[u8]) -> bool {
        false
    }
}

/// One live CDP screencast attachment (spec.md §3 `StreamBinding`).
pub struct StreamBinding {
    pub session_id: String,
    pub tab_id: TabId,
    page: Page,
    pump: JoinHandle<()>,
}

impl StreamBinding {
    async fn teardown(self) {
        // Ignore errors: spec.md §4.3 "Stream teardown errors are swallowed."
        self.pump.abort();
        let _ = self.page.execute(StopScreencastParams::default()).await;
    }
}

/// Stream Binder (SB) — one per session, called under the session mutex so
/// bind/unbind/rebind never interleave (spec.md §5).
pub struct StreamBinder {
    binding: Option<StreamBinding>,
}

impl Default for StreamBinder {
    fn default() -> Self {
        Self { binding: None }
    }
}

impl StreamBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound_to(&self, tab_id: &str) -> bool {
        self.binding.as_ref().is_some_and(|b| b.tab_id == tab_id)
    }

    /// Atomic-replace bind (spec.md §4.3 `bind`). Never propagates an error
    /// to the caller: on failure the binding is left empty and a warning is
    /// logged (spec.md: "bind() never throws to the caller").
    pub async fn bind(
        &mut self,
        session_id: &str,
        tab_id: &TabId,
        page: Page,
        viewport: Viewport,
        quality: u8,
        frame_sink: Arc<dyn FrameSink>,
    ) {
        if let Some(old) = self.binding.take() {
            old.teardown().await;
        }

        match Self::start(session_id, tab_id, page, viewport, quality, frame_sink).await {
            Ok(binding) => self.binding = Some(binding),
            Err(err) => {
                warn!(session_id, tab_id, error = %err, "stream bind failed");
                self.binding = None;
            }
        }
    }

    async fn start(
        session_id: &str,
        tab_id: &TabId,
        page: Page,
        viewport: Viewport,
        quality: u8,
        frame_sink: Arc<dyn FrameSink>,
    ) -> SessionResult<StreamBinding> {
        page.execute(PageEnableParams::default())
            .await
            .map_err(SessionError::from)?;
        page.execute(RuntimeEnableParams::default())
            .await
            .map_err(SessionError::from)?;
        page.execute(DomEnableParams::default())
            .await
            .map_err(SessionError::from)?;

        let mut frames = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(SessionError::from)?;

        page.execute(StartScreencastParams {
            format: Some(CaptureScreenshotFormat::Jpeg),
            quality: Some(quality as i64),
            max_width: Some(viewport.width as i64),
            max_height: Some(viewport.height as i64),
            every_nth_frame: Some(1),
        })
        .await
        .map_err(SessionError::from)?;

        let pump_page = page.clone();
        let pump_session_id = session_id.to_string();
        let pump_tab_id = tab_id.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let decoded = base64::engine::general_purpose::STANDARD.decode(&frame.data);
                match decoded {
                    Ok(bytes) => {
                        if !frame_sink.push_frame(&pump_session_id, &pump_tab_id, &bytes) {
                            debug!(session_id = %pump_session_id, tab_id = %pump_tab_id, "frame dropped (backpressure)");
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to decode screencast frame"),
                }

                if let Err(err) = pump_page
                    .execute(ScreencastFrameAckParams {
                        session_id: frame.session_id,
                    })
                    .await
                {
                    // TargetGone or similar; the pump loop ends naturally
                    // when the event stream closes, so just log here.
                    debug!(error = %err, "failed to ack screencast frame");
                }
            }
        });

        Ok(StreamBinding {
            session_id: session_id.to_string(),
            tab_id: tab_id.clone(),
            page,
            pump,
        })
    }

    /// Stop the screencast, if any. Idempotent (spec.md §4.3 `unbind`).
    pub async fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.teardown().await;
        }
    }

    /// Same as `bind`, plus a single re-confirmation 200ms later to counter
    /// the race where the just-activated tab was not yet foregrounded
    /// (spec.md §4.3 `rebind_on_manual_switch`).
    pub async fn rebind_on_manual_switch(
        &mut self,
        session_id: &str,
        tab_id: &TabId,
        page: Page,
        viewport: Viewport,
        quality: u8,
        frame_sink: Arc<dyn FrameSink>,
    ) {
        self.bind(session_id, tab_id, page.clone(), viewport, quality, frame_sink)
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Err(err) = page.bring_to_front().await {
            debug!(session_id, tab_id, error = %err, "re-confirm bring_to_front failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    impl FrameSink for CountingSink {
        fn push_frame(&self, _session_id: &str, _tab_id: &TabId, _data: &[u8]) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn null_sink_always_drops() {
        let sink = NullFrameSink;
        assert!(!sink.push_frame("s", &"t".to_string(), &[1, 2, 3]));
    }

    #[test]
    fn fresh_binder_has_no_binding() {
        let binder = StreamBinder::new();
        assert!(!binder.is_bound_to("anything"));
    }

    #[tokio::test]
    async fn counting_sink_counts() {
        let sink = CountingSink(AtomicUsize::new(0));
        sink.push_frame("s", &"t".to_string(), &[]);
        sink.push_frame("s", &"t".to_string(), &[]);
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }
}
