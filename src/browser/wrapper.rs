//! Browser lifecycle management.
//!
//! Handles launching and managing chromiumoxide browser instances with
//! stealth configuration to avoid bot detection. One `BrowserWrapper` is
//! created per [`Session`](crate::session::Session) — never shared.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SessionOptions;
use crate::stealth::platform::Platform;

/// Wrapper for Browser and its event handler task.
///
/// Ensures handler is properly cleaned up when browser is dropped. Handler
/// MUST be aborted to prevent it running indefinitely after browser is
/// closed.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    /// Get reference to inner browser.
    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Get mutable reference to inner browser.
    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    /// Clean up temp directory (blocking operation).
    ///
    /// MUST be called AFTER `browser.wait()` completes to ensure Chrome has
    /// released all file handles. Windows will fail to remove locked files.
    /// Uses blocking `std::fs::remove_dir_all()` because this may be called
    /// from `Drop` context where async is not available.
    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!(
                    "failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }

    /// Prevent automatic cleanup (for debugging). Preserves the profile
    /// directory for inspection after a crash.
    #[allow(dead_code)]
    pub fn keep_temp_dir(mut self) {
        self.user_data_dir = None;
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        info!("dropping BrowserWrapper, aborting handler task");
        self.handler.abort();
        // Browser::drop() will kill the Chrome process; the handler task
        // must still be aborted explicitly or it runs forever.

        if self.user_data_dir.is_some() {
            tracing::warn!(
                "BrowserWrapper dropped without explicit cleanup; temp directory {} \
                will be orphaned. Call SessionLifecycleManager::cleanup() first.",
                self.user_data_dir.as_ref().unwrap().display()
            );
        }
    }
}

/// Launch a new, exclusively-owned browser instance for one session.
///
/// Returns `(Browser, JoinHandle, PathBuf)` where `PathBuf` is the temp
/// profile directory that MUST be cleaned up after the browser shuts down.
/// `session_id` keys the profile directory so concurrent sessions never
/// contend for the same Chrome user-data-dir.
pub async fn launch_browser(
    session_id: &str,
    options: &SessionOptions,
    platform: Option<Platform>,
) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    info!(session_id, "launching browser instance for session");

    let user_data_dir = std::env::temp_dir().join(format!("browser_session_fleet_{session_id}"));

    let (browser, handler) = crate::browser_setup::launch_browser(
        true, // always headless: this is a server-side fleet
        Some(user_data_dir.clone()),
        false,
        options.viewport,
        platform,
    )
    .await?;

    Ok((browser, handler, user_data_dir))
}

/// Create a blank page for stealth injection.
///
/// The page must be blank before stealth features are applied, then
/// navigation to the target URL occurs — `evaluateOnNewDocument` scripts
/// only take effect on the *next* navigation.
pub async fn create_blank_page(wrapper: &BrowserWrapper) -> Result<Page> {
    let page = wrapper
        .browser()
        .new_page("about:blank")
        .await
        .context("failed to create blank page")?;

    info!("created blank page for stealth injection");
    Ok(page)
}

/// Get the first/primary page from the browser.
pub async fn get_current_page(wrapper: &BrowserWrapper) -> Result<Page> {
    let pages = wrapper
        .browser()
        .pages()
        .await
        .context("failed to get browser pages")?;

    pages
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no page loaded"))
}
