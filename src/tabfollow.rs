//! Tab-Follow Scheduler (TFS) — spec.md §4.2.
//!
//! One task per session, spawned by [`SessionLifecycleManager::create`]
//! (`session/lifecycle.rs`) and cancelled by [`Session::cancel_tfs`]. Runs on
//! a fixed cadence (`session.options.tab_scan_interval()`, default 2.5s),
//! serialized with manual switches and cleanup by the session's own
//! `inner` mutex (spec.md §5) — CDP calls and in-page evaluations happen
//! *outside* that lock, exactly like `StreamBinder::bind` does.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::Page;
use tracing::{debug, warn};

use crate::fanout::{TabEventSink, TabSwitchedEvent};
use crate::session::{Session, SessionStatus};
use crate::stealth::activity::{ACTIVITY_SNAPSHOT_SCRIPT, ActivitySnapshot};
use crate::tab::{Tab, TabId};
use crate::utils::timeout::TAB_FOLLOW_TICK_BUDGET;

/// Bound on a single in-page snapshot evaluation (spec.md §4.4 contract:
/// "must complete in bounded time or be treated as no activity").
const SNAPSHOT_EVAL_BUDGET: Duration = Duration::from_millis(300);

/// The gate in spec.md §4.2 step 6: "winning score < 1000 — no clear
/// signal — keep current."
const MIN_WINNING_SCORE: i64 = 1_000;

/// Runs until the session's `cancellation` token fires. Owned by
/// `session/lifecycle.rs::spawn_tab_follow`.
pub async fn run(session: Arc<Session>, sink: Arc<dyn TabEventSink>) {
    let mut ticker = tokio::time::interval(session.options.tab_scan_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = session.cancellation.cancelled() => {
                debug!(session_id = %session.id, "tab-follow task cancelled");
                return;
            }
            _ = ticker.tick() => {
                match tokio::time::timeout(TAB_FOLLOW_TICK_BUDGET, tick(&session, sink.as_ref())).await {
                    Ok(()) => {}
                    Err(_) => {
                        // spec.md §5: "on overrun, the tick is abandoned and
                        // the session's last state is kept."
                        warn!(session_id = %session.id, "tab-follow tick exceeded its 1.5s budget, abandoned");
                    }
                }
            }
        }
    }
}

/// One candidate gathered this tick: a live page plus its freshly observed
/// url/title/activity, matched back to the registry under the session lock.
struct Observed {
    id: TabId,
    page: Page,
    url: String,
    title: String,
    snapshot: ActivitySnapshot,
}

async fn tick(session: &Arc<Session>, sink: &dyn TabEventSink) {
    {
        let inner = session.inner.lock().await;
        // spec.md §3: "while status≠active, no new periodic tasks are
        // created" — an in-flight tick that outlives a status flip to
        // cleaning_up simply has nothing left to commit.
        if inner.status != SessionStatus::Active {
            return;
        }
    }

    let pages = match enumerate_targets(session).await {
        Some(pages) => pages,
        None => return,
    };

    let observed = gather(pages).await;

    let commit = {
        let mut inner = session.inner.lock().await;

        refresh_registry(&mut inner.tabs, &observed);

        let live: HashSet<&str> = observed.iter().map(|o| o.id.as_str()).collect();
        let stale: Vec<TabId> = inner
            .tabs
            .list()
            .iter()
            .filter(|tab| !live.contains(tab.id.as_str()))
            .map(|tab| tab.id.clone())
            .collect();
        for id in stale {
            inner.tabs.remove(&id);
        }

        let current = inner.active_tab_id.clone();
        let scored: Vec<(TabId, i64, Instant)> = observed
            .iter()
            .filter_map(|o| {
                let tab = inner.tabs.get(&o.id)?;
                Some((o.id.clone(), score_candidate(tab, &o.snapshot), tab.last_active_at))
            })
            .collect();

        let winner = pick_winner(&scored, current.as_deref());

        // Gate 1: manual-protection window (spec.md §4.2 step 6).
        if inner.manual_protection.as_ref().is_some_and(|mp| mp.is_active()) {
            None
        } else if let Some((winner_id, winner_score)) = winner {
            // Gate 2: no clear signal.
            if winner_score < MIN_WINNING_SCORE {
                None
            } else if Some(winner_id.as_str()) == current.as_deref() {
                // Gate 3: winner equals current — nothing to commit.
                None
            } else {
                inner.set_active_tab(Some(winner_id.clone()));
                observed
                    .iter()
                    .find(|o| o.id == winner_id)
                    .map(|o| (o.id.clone(), o.page.clone(), o.url.clone(), o.title.clone()))
            }
        } else {
            None
        }
    };

    let Some((tab_id, page, url, title)) = commit else {
        return;
    };

    if let Err(err) = page.bring_to_front().await {
        debug!(session_id = %session.id, tab_id = %tab_id, error = %err, "bring_to_front failed after tab switch");
    }

    {
        let mut inner = session.inner.lock().await;
        if inner.streaming_enabled {
            inner
                .binder
                .bind(
                    &session.id,
                    &tab_id,
                    page,
                    session.options.viewport,
                    session.options.stream_jpeg_quality,
                    session.frame_sink.clone(),
                )
                .await;
        }
    }

    sink.emit_tab_switched(TabSwitchedEvent {
        session_id: session.id.clone(),
        tab_id: tab_id.clone(),
        url,
        title,
    })
    .await;

    emit_tab_list(session, sink).await;

    debug!(session_id = %session.id, tab_id = %tab_id, "tab-follow committed a switch");
}

/// spec.md §4.2 step 1: "ask the browser for all page-type targets."
/// `chromiumoxide::Browser::pages` enumerates exactly that — one `Page`
/// handle per live page target.
async fn enumerate_targets(session: &Arc<Session>) -> Option<Vec<Page>> {
    let browser_guard = session.browser.lock().await;
    let wrapper = browser_guard.as_ref()?;
    match wrapper.browser().pages().await {
        Ok(pages) => Some(pages),
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to enumerate targets this tick");
            None
        }
    }
}

/// Reads url/title/activity off each live page, outside the session lock.
/// A page whose target died mid-enumeration (spec.md §7 `TargetGone`) is
/// silently dropped from this tick's candidates — it falls out of the
/// registry on the next tick's stale-removal pass.
async fn gather(pages: Vec<Page>) -> Vec<Observed> {
    let mut observed = Vec::with_capacity(pages.len());
    for page in pages {
        let id = page.target_id().to_string();
        let url = match page.url().await {
            Ok(url) => url.unwrap_or_default(),
            Err(err) => {
                debug!(tab_id = %id, error = %err, "target gone while reading url");
                continue;
            }
        };
        let title = read_title(&page).await;
        let snapshot = snapshot_activity(&page).await;
        observed.push(Observed { id, page, url, title, snapshot });
    }
    observed
}

async fn read_title(page: &Page) -> String {
    match page.evaluate("document.title").await {
        Ok(result) => result.into_value::<String>().unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// spec.md §4.4 contract: "snapshot evaluation must complete in bounded
/// time or be treated as no activity."
async fn snapshot_activity(page: &Page) -> ActivitySnapshot {
    let eval = page.evaluate(ACTIVITY_SNAPSHOT_SCRIPT);
    match tokio::time::timeout(SNAPSHOT_EVAL_BUDGET, eval).await {
        Ok(Ok(result)) => result
            .into_value::<ActivitySnapshot>()
            .unwrap_or_else(|_| ActivitySnapshot::no_activity()),
        _ => ActivitySnapshot::no_activity(),
    }
}

/// spec.md §4.2 step 2: upsert url/title, advancing `last_active_at` when
/// the url changed.
fn refresh_registry(tabs: &mut crate::tab::TabRegistry, observed: &[Observed]) {
    for o in observed {
        tabs.upsert(o.id.clone(), &o.url, &o.title);
    }
}

/// spec.md §4.2 step 4 scoring table. Internal-scheme filtering (step 3)
/// is folded in as the `-1000` penalty rather than exclusion, matching the
/// spec note that filtered tabs "remain in TR as candidates but score 0 or
/// less."
fn score_candidate(tab: &Tab, snap: &ActivitySnapshot) -> i64 {
    let mut score: i64 = 0;

    if tab.is_http() {
        score += 200;
    }
    // "base constant | always for a visible candidate | +100" — every
    // enumerated candidate is visible to TFS in this sense (it is a live
    // target worth scoring at all).
    score += 100;

    if snap.has_form_activity {
        score += 12_000;
    } else if snap.has_input_focus {
        score += 8_000;
    }

    if snap.is_active_element {
        score += 4_000;
    }

    if snap.is_visible && snap.has_focus && (snap.has_form_activity || snap.has_input_focus) {
        score += 5_000;
    }

    if snap.is_visible && snap.has_focus {
        if snap.within(3_000) {
            score += 8_000;
        } else if snap.within(5_000) {
            score += 6_000;
        } else if snap.within(10_000) {
            score += 4_000;
        } else if snap.within(15_000) {
            score += 500;
        }
    } else if snap.within(3_000) {
        score += 3_000;
    } else if snap.within(15_000) {
        score += 500;
    }

    let since_active = tab.last_active_at.elapsed().as_millis() as i64;
    if since_active <= 2_000 {
        score += 1_500;
    } else if since_active <= 5_000 {
        score += 1_000;
    } else if since_active <= 15_000 {
        score += 500;
    } else if since_active <= 30_000 {
        score += 200;
    }

    if tab.is_internal_scheme() {
        score -= 1_000;
    }

    score
}

/// spec.md §4.2 step 5: highest score wins; tie → most recent
/// `last_active_at`; further tie → the current `active_tab_id` (stability,
/// spec.md §8 "Score stability").
fn pick_winner(scored: &[(TabId, i64, Instant)], current: Option<&str>) -> Option<(TabId, i64)> {
    scored
        .iter()
        .max_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| (current == Some(a.0.as_str())).cmp(&(current == Some(b.0.as_str()))))
        })
        .map(|(id, score, _)| (id.clone(), *score))
}

async fn emit_tab_list(session: &Arc<Session>, sink: &dyn TabEventSink) {
    sink.emit_tab_list(session.tab_list_event().await).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::activity::ActivitySnapshot;
    use crate::tab::Tab;
    use std::thread::sleep;

    fn fresh_tab(url: &str) -> Tab {
        Tab::new("t1".to_string(), url, "Title")
    }

    fn aged_tab(url: &str, age: Duration) -> Tab {
        let mut tab = Tab::new("t1".to_string(), url, "Title");
        tab.last_active_at = Instant::now() - age;
        tab.created_at = tab.last_active_at;
        tab
    }

    #[test]
    fn real_url_no_activity_scores_base_only() {
        let tab = aged_tab("https://example.com", Duration::from_secs(60));
        let snap = ActivitySnapshot::no_activity();
        assert_eq!(score_candidate(&tab, &snap), 300);
    }

    #[test]
    fn form_activity_dominates_the_score() {
        let tab = aged_tab("https://example.com", Duration::from_secs(60));
        let snap = ActivitySnapshot {
            has_form_activity: true,
            is_visible: true,
            has_focus: true,
            time_since_last_activity: i64::MAX,
            ..Default::default()
        };
        // 200 (http) + 100 (base) + 12000 (form) + 5000 (visible+focused+form) = 17300.
        // time_since_last_activity is set to "never" so none of the visible+focused
        // recency tiers (+8000/+6000/+4000/+500) or the tab-age recency tiers kick in,
        // isolating the form-activity contribution this test is named for.
        assert_eq!(score_candidate(&tab, &snap), 17_300);
    }

    #[test]
    fn scenario_one_new_tab_wins() {
        // spec.md §8 scenario 1: B scores >= 17200 vs A's <= 300.
        let tab_b = fresh_tab("https://x.example/search");
        let snap_b = ActivitySnapshot {
            has_form_activity: true,
            is_visible: true,
            has_focus: true,
            time_since_last_activity: 500,
            ..Default::default()
        };
        let score_b = score_candidate(&tab_b, &snap_b);
        assert!(score_b >= 17_200, "got {score_b}");

        let tab_a = aged_tab("https://example.com", Duration::from_secs(120));
        let score_a = score_candidate(&tab_a, &ActivitySnapshot::no_activity());
        assert!(score_a <= 300);
        assert!(score_b > score_a);
    }

    #[test]
    fn internal_scheme_scores_at_or_below_zero() {
        let tab = aged_tab("chrome-extension://abc/page.html", Duration::from_secs(60));
        let score = score_candidate(&tab, &ActivitySnapshot::no_activity());
        assert!(score <= 0, "got {score}");
    }

    #[test]
    fn scenario_three_real_tab_beats_five_extension_tabs() {
        let real = aged_tab("https://y.example/", Duration::from_secs(120));
        let real_score = score_candidate(&real, &ActivitySnapshot::no_activity());
        assert_eq!(real_score, 300);

        for i in 0..5 {
            let ext = aged_tab(&format!("chrome-extension://ext{i}/page.html"), Duration::from_secs(120));
            let ext_score = score_candidate(&ext, &ActivitySnapshot::no_activity());
            assert!(ext_score <= 0);
            assert!(real_score > ext_score);
        }
    }

    #[test]
    fn recency_tiers_are_exclusive_and_decreasing() {
        let snap = ActivitySnapshot::no_activity();
        let t_2s = score_candidate(&aged_tab("https://e.com", Duration::from_millis(500)), &snap);
        let t_5s = score_candidate(&aged_tab("https://e.com", Duration::from_millis(3_000)), &snap);
        let t_15s = score_candidate(&aged_tab("https://e.com", Duration::from_millis(10_000)), &snap);
        let t_30s = score_candidate(&aged_tab("https://e.com", Duration::from_millis(20_000)), &snap);
        let t_old = score_candidate(&aged_tab("https://e.com", Duration::from_secs(60)), &snap);
        assert!(t_2s > t_5s && t_5s > t_15s && t_15s > t_30s && t_30s > t_old);
    }

    #[test]
    fn tie_break_prefers_more_recent_last_active_at() {
        let older = Instant::now() - Duration::from_secs(10);
        sleep(Duration::from_millis(2));
        let newer = Instant::now() - Duration::from_secs(1);
        let scored = vec![
            ("a".to_string(), 5_000i64, older),
            ("b".to_string(), 5_000i64, newer),
        ];
        let (winner, score) = pick_winner(&scored, None).unwrap();
        assert_eq!(winner, "b");
        assert_eq!(score, 5_000);
    }

    #[test]
    fn tie_break_retains_current_tab_on_full_tie() {
        let now = Instant::now();
        let scored = vec![
            ("a".to_string(), 5_000i64, now),
            ("b".to_string(), 5_000i64, now),
        ];
        let (winner, _) = pick_winner(&scored, Some("a")).unwrap();
        assert_eq!(winner, "a");
    }

    #[test]
    fn pick_winner_empty_is_none() {
        let scored: Vec<(TabId, i64, Instant)> = Vec::new();
        assert!(pick_winner(&scored, None).is_none());
    }
}
