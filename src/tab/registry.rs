//! Tab Registry storage (spec.md §4.6): `list`, `active`, `upsert`, `remove`.

use std::collections::HashMap;

use super::{Tab, TabId};

/// Per-session mapping tab-id → Tab (spec.md §3).
///
/// No internal synchronization — callers hold the owning session's mutex
/// for the duration of any mutation (spec.md §5).
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: HashMap<TabId, Tab>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<&Tab> {
        self.tabs.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Tab> {
        self.tabs.get(id)
    }

    pub fn active(&self, active_tab_id: Option<&str>) -> Option<&Tab> {
        active_tab_id.and_then(|id| self.tabs.get(id))
    }

    /// Insert a newly discovered tab, or update an existing one's url/title.
    /// Returns `true` if the url changed (callers advance `last_active_at`
    /// accordingly — spec.md §4.2 step 2).
    pub fn upsert(&mut self, id: TabId, url: impl Into<String>, title: impl Into<String>) -> bool {
        let url = url.into();
        let title = title.into();
        match self.tabs.get_mut(&id) {
            Some(tab) => {
                let url_changed = tab.url != url;
                if url_changed {
                    tab.url = url;
                    tab.last_active_at = std::time::Instant::now();
                }
                tab.title = title;
                url_changed
            }
            None => {
                self.tabs.insert(id.clone(), Tab::new(id, url, title));
                false
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Tab> {
        self.tabs.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tabs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Move `is_active` to exactly `winner` (spec.md §3 invariant: exactly
    /// one tab has `is_active=true` iff `active_tab_id` is set).
    pub fn set_active(&mut self, winner: Option<&str>) {
        for (id, tab) in self.tabs.iter_mut() {
            tab.is_active = Some(id.as_str()) == winner;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_detects_url_change() {
        let mut tr = TabRegistry::new();
        assert!(!tr.upsert("t1".to_string(), "about:blank", ""));
        assert!(tr.upsert("t1".to_string(), "https://example.com", "Example"));
        assert!(!tr.upsert("t1".to_string(), "https://example.com", "Example 2"));
        assert_eq!(tr.get("t1").unwrap().title, "Example 2");
    }

    #[test]
    fn set_active_is_exclusive() {
        let mut tr = TabRegistry::new();
        tr.upsert("a".to_string(), "https://a.example", "A");
        tr.upsert("b".to_string(), "https://b.example", "B");
        tr.set_active(Some("a"));
        assert!(tr.get("a").unwrap().is_active);
        assert!(!tr.get("b").unwrap().is_active);
        tr.set_active(Some("b"));
        assert!(!tr.get("a").unwrap().is_active);
        assert!(tr.get("b").unwrap().is_active);
    }

    #[test]
    fn remove_drops_entry() {
        let mut tr = TabRegistry::new();
        tr.upsert("a".to_string(), "https://a.example", "A");
        assert!(tr.remove("a").is_some());
        assert!(!tr.contains("a"));
    }
}
