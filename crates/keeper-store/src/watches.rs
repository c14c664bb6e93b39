//! Data and list watch tables (§4.5.2). A watch fires at most once and is
//! removed from its table on fire; each session tracks the paths it holds
//! watches on so a disconnect clears them in `O(watches_of_session)`
//! rather than scanning every table.

use std::collections::{HashMap, HashSet};

use crucible_types::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Created,
    Deleted,
    Changed,
    Child,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub session: SessionId,
    pub path: String,
    pub event_type: WatchEventType,
}

#[derive(Default)]
pub struct WatchTables {
    data: HashMap<String, HashSet<SessionId>>,
    list: HashMap<String, HashSet<SessionId>>,
}

impl WatchTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data_watch(&mut self, path: &str, session: SessionId) {
        self.data.entry(path.to_owned()).or_default().insert(session);
    }

    pub fn add_list_watch(&mut self, path: &str, session: SessionId) {
        self.list.entry(path.to_owned()).or_default().insert(session);
    }

    /// On `Create` at `path`: fire list watches registered on `parent`.
    pub fn fire_on_create(&mut self, path: &str, parent: &str) -> Vec<WatchEvent> {
        let _ = path;
        self.take_list(parent)
            .into_iter()
            .map(|session| WatchEvent {
                session,
                path: parent.to_owned(),
                event_type: WatchEventType::Child,
            })
            .collect()
    }

    /// On `Remove` at `path`: fire data watches at `path`, list watches at
    /// `path`, and list watches at `parent(path)`.
    pub fn fire_on_remove(&mut self, path: &str, parent: &str) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        for session in self.take_data(path) {
            events.push(WatchEvent {
                session,
                path: path.to_owned(),
                event_type: WatchEventType::Deleted,
            });
        }
        for session in self.take_list(path) {
            events.push(WatchEvent {
                session,
                path: path.to_owned(),
                event_type: WatchEventType::Deleted,
            });
        }
        for session in self.take_list(parent) {
            events.push(WatchEvent {
                session,
                path: parent.to_owned(),
                event_type: WatchEventType::Child,
            });
        }
        events
    }

    /// On `Set` at `path`: fire data watches at `path` only.
    pub fn fire_on_set(&mut self, path: &str) -> Vec<WatchEvent> {
        self.take_data(path)
            .into_iter()
            .map(|session| WatchEvent {
                session,
                path: path.to_owned(),
                event_type: WatchEventType::Changed,
            })
            .collect()
    }

    fn take_data(&mut self, path: &str) -> HashSet<SessionId> {
        self.data.remove(path).unwrap_or_default()
    }

    fn take_list(&mut self, path: &str) -> HashSet<SessionId> {
        self.list.remove(path).unwrap_or_default()
    }

    /// Clears every watch a disconnecting/expiring session holds, given
    /// the set of paths it was tracking (§4.5.2's per-session bookkeeping
    /// lives on the session, not here; the caller passes it in).
    pub fn clear_session(&mut self, session: SessionId, data_paths: &HashSet<String>, list_paths: &HashSet<String>) {
        for path in data_paths {
            if let Some(set) = self.data.get_mut(path) {
                set.remove(&session);
                if set.is_empty() {
                    self.data.remove(path);
                }
            }
        }
        for path in list_paths {
            if let Some(set) = self.list.get_mut(path) {
                set.remove(&session);
                if set.is_empty() {
                    self.list.remove(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_fires_list_watch_on_parent_only() {
        let mut watches = WatchTables::new();
        watches.add_list_watch("/a", SessionId::new(1));
        watches.add_data_watch("/a/b", SessionId::new(1));
        let events = watches.fire_on_create("/a/b", "/a");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, "/a");
        assert_eq!(events[0].event_type, WatchEventType::Child);
    }

    #[test]
    fn remove_fires_data_and_both_list_watches() {
        let mut watches = WatchTables::new();
        watches.add_data_watch("/a/b", SessionId::new(1));
        watches.add_list_watch("/a/b", SessionId::new(2));
        watches.add_list_watch("/a", SessionId::new(3));
        let mut events = watches.fire_on_remove("/a/b", "/a");
        events.sort_by_key(|e| e.session.get());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, WatchEventType::Deleted);
        assert_eq!(events[2].event_type, WatchEventType::Child);
    }

    #[test]
    fn a_watch_fires_at_most_once() {
        let mut watches = WatchTables::new();
        watches.add_data_watch("/a", SessionId::new(1));
        assert_eq!(watches.fire_on_set("/a").len(), 1);
        assert_eq!(watches.fire_on_set("/a").len(), 0);
    }
}
