//! Multi-tenant headless-browser session platform.
//!
//! Fronts a Chromium engine, controlled over CDP via `chromiumoxide`, with
//! three cooperating subsystems: a session lifecycle manager that keeps
//! per-tenant browser contexts alive and bounds resource usage (`session`),
//! a tab-follow scheduler that tracks which tab an externally-driven agent
//! is currently using and binds a single screencast stream to it
//! (`tabfollow`, `stream`), and a stealth/fingerprint layer that makes the
//! automated browser present as a human visitor (`stealth`).
//!
//! The HTTP/WebSocket API surface, the child-process LLM agent, and the
//! proxy-rotation selector are out of scope — this crate exposes trait
//! seams (`fanout::TabEventSink`, `stream::FrameSink`,
//! `session::lifecycle::ChildAgentHandle`) for a host process to wire in.

pub mod browser;
pub mod browser_setup;
pub mod config;
pub mod error;
pub mod fanout;
pub mod session;
pub mod stealth;
pub mod stream;
pub mod tab;
mod tabfollow;
pub mod utils;

pub use browser::{BrowserError, BrowserResult, BrowserWrapper, create_blank_page, get_current_page};
pub use config::{FleetConfig, SessionOptions, Viewport};
pub use error::{SessionError, SessionResult};
pub use fanout::{
    AvailableTabsEvent, NoopFanout, SessionCleanupEvent, TabEventSink, TabSummary, TabSwitchedEvent,
};
pub use session::lifecycle::{ChildAgentHandle, SessionLifecycleManager};
pub use session::{ManualProtection, Session, SessionId, SessionSnapshot, SessionStatus};
pub use stealth::{Fingerprint, Platform};
pub use stream::{FrameSink, NullFrameSink, StreamBinder};
pub use tab::{Tab, TabId, TabRegistry};

/// Initializes the crate's `tracing` subscriber from `RUST_LOG` (defaulting
/// to `info`), matching the teacher's `env_logger`/`tracing` side-by-side
/// setup at the binary entry point. Safe to call once per process; a
/// second call is a harmless no-op (errors are swallowed).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
