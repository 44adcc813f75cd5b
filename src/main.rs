// Multi-tenant headless-browser session fleet daemon.
//
// The HTTP/WebSocket API surface that drives session creation and tab
// control is out of scope for this crate (spec.md §1); this binary only
// owns the process-wide `SessionLifecycleManager` singleton (spec.md §9:
// "a per-process singleton only by construction in the entry point") and
// its background timers, and drains every session on shutdown signal.

use anyhow::Result;

use browser_session_fleet::{FleetConfig, SessionLifecycleManager};

#[tokio::main]
async fn main() -> Result<()> {
    browser_session_fleet::init_tracing();

    let config = FleetConfig::default();
    tracing::info!(
        max_concurrent = config.max_concurrent,
        "starting browser session fleet"
    );

    let slm = SessionLifecycleManager::new(config);

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        active = slm.active_count(),
        "shutdown signal received, draining sessions"
    );
    slm.destroy_all().await;

    Ok(())
}
