//! Browser infrastructure for launching and managing Chrome instances.
//!
//! Each [`Session`](crate::session::Session) owns exactly one
//! [`BrowserWrapper`] for its lifetime (spec.md §3: "exclusive ownership of
//! a single browser instance"); there is no process-wide shared browser
//! singleton here — that pattern belonged to the teacher's single-tool MCP
//! server, not to a multi-tenant fleet where each tenant's browser must be
//! isolated and independently destroyable.

mod wrapper;

pub use wrapper::{BrowserWrapper, create_blank_page, get_current_page, launch_browser};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("failed to find browser executable: {0}")]
    NotFound(String),

    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("failed to create page: {0}")]
    PageCreationFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("io error: {0}")]
    IoError(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

impl From<BrowserError> for crate::error::SessionError {
    fn from(err: BrowserError) -> Self {
        crate::error::SessionError::LaunchFailed(err.to_string())
    }
}
