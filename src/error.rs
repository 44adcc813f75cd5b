//! Crate-wide error taxonomy.
//!
//! Mirrors the error handling design in spec.md §7: most failures below the
//! per-session mutex are recovered locally and logged (see
//! `session::lifecycle` and `tabfollow`); only `Capacity` and explicit
//! user-requested failures are meant to surface to API callers.

use thiserror::Error;

/// Top-level error type for session lifecycle and tab-follow operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `create()` was called while `active count >= max_concurrent`.
    #[error("capacity exceeded: {active}/{max} sessions active")]
    CapacityExceeded { active: usize, max: usize },

    /// No session exists with the given id (it may have already been
    /// cleaned up).
    #[error("session not found: {0}")]
    NotFound(String),

    /// A CDP call targeted a tab/target that no longer exists.
    #[error("target gone: {0}")]
    TargetGone(String),

    /// `StreamBinder::bind` failed; streaming is disabled for the session
    /// until a later tick retries.
    #[error("stream bind failed: {0}")]
    StreamBindFailure(String),

    /// A subordinate child agent (out of scope for this crate, modeled as
    /// `ChildAgentHandle`) reported failure.
    #[error("child agent failure: {0}")]
    ChildAgentFailure(String),

    /// Stealth or activity-tracker script injection failed. Non-fatal: the
    /// session continues with reduced stealth (detection risk accepted).
    #[error("injection failed: {0}")]
    InjectionFailure(String),

    /// Browser launch failed.
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<chromiumoxide::error::CdpError> for SessionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let msg = err.to_string();
        if msg.contains("No target with given id") || msg.contains("No session with given id") {
            SessionError::TargetGone(msg)
        } else {
            SessionError::StreamBindFailure(msg)
        }
    }
}
