//! Session table and expiry queue (§4.5.3). Allocation happens only
//! through the consensus-committed `NewSession` op; this module is the
//! state machine's bookkeeping for sessions once allocated, plus the
//! priority queue a dedicated checker scans to find expired ones.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crucible_types::SessionId;

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub timeout_ms: i64,
    pub last_heartbeat_ms: i64,
    pub ephemerals: HashSet<String>,
    pub data_watches: HashSet<String>,
    pub list_watches: HashSet<String>,
    pub auth: Vec<(String, String)>,
}

impl SessionInfo {
    fn new(timeout_ms: i64, now_ms: i64) -> Self {
        SessionInfo {
            timeout_ms,
            last_heartbeat_ms: now_ms,
            ephemerals: HashSet::new(),
            data_watches: HashSet::new(),
            list_watches: HashSet::new(),
            auth: Vec::new(),
        }
    }

    pub fn deadline_ms(&self) -> i64 {
        self.last_heartbeat_ms + self.timeout_ms
    }
}

#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, SessionInfo>,
    next_id: i64,
    /// `(deadline, session)` ordered so `peek` returns the soonest
    /// deadline first. Stale entries (superseded by a later heartbeat)
    /// are filtered lazily when popped, rather than removed eagerly —
    /// cheaper than a keyed reposition for a checker that runs
    /// periodically, not per heartbeat.
    expiry: BinaryHeap<Reverse<(i64, SessionId)>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next session id (§4.5.3: "the state machine, upon
    /// commit, picks the next session id from its counter").
    pub fn new_session(&mut self, timeout_ms: i64, now_ms: i64) -> SessionId {
        self.next_id += 1;
        let id = SessionId::new(self.next_id);
        let info = SessionInfo::new(timeout_ms, now_ms);
        self.expiry.push(Reverse((info.deadline_ms(), id)));
        self.sessions.insert(id, info);
        id
    }

    /// Reconnect: refreshes an existing session if still live, otherwise
    /// reports it expired so the caller treats it as a fresh allocation
    /// failure.
    pub fn reconnect(&mut self, id: SessionId, timeout_ms: i64, now_ms: i64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(info) if info.deadline_ms() >= now_ms => {
                info.timeout_ms = timeout_ms;
                info.last_heartbeat_ms = now_ms;
                self.expiry.push(Reverse((info.deadline_ms(), id)));
                true
            }
            _ => false,
        }
    }

    pub fn heartbeat(&mut self, id: SessionId, now_ms: i64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(info) => {
                info.last_heartbeat_ms = now_ms;
                self.expiry.push(Reverse((info.deadline_ms(), id)));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionInfo> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionInfo> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Pops every session id whose deadline has passed as of `now_ms`,
    /// skipping stale heap entries superseded by a later heartbeat.
    /// Dumps every live session's `(id, timeout, last_heartbeat,
    /// ephemerals)`, for the session+timeout and ephemerals snapshot
    /// objects (§4.5.5).
    pub fn snapshot(&self) -> Vec<(SessionId, SessionInfo)> {
        self.sessions.iter().map(|(&id, info)| (id, info.clone())).collect()
    }

    /// Rebuilds a session table from a prior [`snapshot`] dump.
    pub fn from_snapshot(entries: Vec<(SessionId, SessionInfo)>) -> Self {
        let mut table = SessionTable::new();
        for (id, info) in entries {
            table.next_id = table.next_id.max(id.get());
            table.expiry.push(Reverse((info.deadline_ms(), id)));
            table.sessions.insert(id, info);
        }
        table
    }

    pub fn expired_as_of(&mut self, now_ms: i64) -> Vec<SessionId> {
        let mut expired = Vec::new();
        while let Some(&Reverse((deadline, id))) = self.expiry.peek() {
            if deadline > now_ms {
                break;
            }
            self.expiry.pop();
            let Some(info) = self.sessions.get(&id) else {
                continue;
            };
            if info.deadline_ms() == deadline {
                expired.push(id);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_get_increasing_ids() {
        let mut table = SessionTable::new();
        let a = table.new_session(1000, 0);
        let b = table.new_session(1000, 0);
        assert!(b.get() > a.get());
    }

    #[test]
    fn expired_as_of_only_reports_past_deadlines() {
        let mut table = SessionTable::new();
        let id = table.new_session(1000, 0);
        assert!(table.expired_as_of(500).is_empty());
        assert_eq!(table.expired_as_of(1500), vec![id]);
    }

    #[test]
    fn heartbeat_pushes_deadline_out_and_suppresses_the_stale_entry() {
        let mut table = SessionTable::new();
        let id = table.new_session(1000, 0);
        table.heartbeat(id, 900);
        // Original deadline (1000) has passed, but the session heartbeat
        // at 900 pushed its real deadline to 1900.
        assert!(table.expired_as_of(1000).is_empty());
        assert_eq!(table.expired_as_of(1900), vec![id]);
    }
}
