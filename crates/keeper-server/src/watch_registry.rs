//! Per-connection watch delivery (§4.5.2, §7.3). Each live session owns an
//! outbound channel the server pushes [`Notification`]s onto as the state
//! machine fires watches; [`WatchRegistry::restore`] implements the
//! `SetWatches`-on-reconnect supplement (silently re-registering a
//! reconnecting client's previous watch set without firing it).

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crucible_keeper_store::{KeeperStore, WatchEvent};
use crucible_types::SessionId;

use crate::protocol::WatchType;

#[derive(Debug, Clone)]
pub struct Notification {
    pub watch_type: WatchType,
    pub path: String,
}

#[derive(Default)]
pub struct WatchRegistry {
    senders: Mutex<HashMap<SessionId, mpsc::UnboundedSender<Notification>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the outbound channel a connection reads notifications
    /// from for the lifetime of its session.
    pub fn attach(&self, session: SessionId) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(session, tx);
        rx
    }

    pub fn detach(&self, session: SessionId) {
        self.senders.lock().remove(&session);
    }

    /// Delivers every watch event the state machine just fired to the
    /// owning session's channel. A missing/closed channel (the connection
    /// already dropped) is silently ignored — the session's watches are
    /// cleared separately when its session itself expires.
    pub fn deliver(&self, events: &[WatchEvent]) {
        let senders = self.senders.lock();
        for event in events {
            if let Some(sender) = senders.get(&event.session) {
                let _ = sender.send(Notification { watch_type: event.event_type.into(), path: event.path.clone() });
            }
        }
    }

    /// Restores a reconnecting client's previous watch sets against the
    /// live state machine without firing them (§7.3 supplement, grounded
    /// on `KeeperServer.cpp`'s `SetWatches` handling: "restoration is
    /// silent, only a subsequent mutation fires the restored watch").
    pub fn restore(&self, store: &KeeperStore, session: SessionId, data_paths: &[String], list_paths: &[String]) {
        for path in data_paths {
            store.restore_data_watch(path, session);
        }
        for path in list_paths {
            store.restore_list_watch(path, session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_then_deliver_reaches_the_right_session_only() {
        let registry = WatchRegistry::new();
        let mut rx_a = registry.attach(SessionId::new(1));
        let _rx_b = registry.attach(SessionId::new(2));

        registry.deliver(&[WatchEvent {
            session: SessionId::new(1),
            path: "/a".to_owned(),
            event_type: crucible_keeper_store::WatchEventType::Changed,
        }]);

        let notification = rx_a.try_recv().unwrap();
        assert_eq!(notification.path, "/a");
    }

    #[test]
    fn detach_silences_future_deliveries() {
        let registry = WatchRegistry::new();
        let mut rx = registry.attach(SessionId::new(1));
        registry.detach(SessionId::new(1));
        registry.deliver(&[WatchEvent {
            session: SessionId::new(1),
            path: "/a".to_owned(),
            event_type: crucible_keeper_store::WatchEventType::Changed,
        }]);
        assert!(rx.try_recv().is_err());
    }
}
