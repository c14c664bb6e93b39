//! Cluster configuration changes (§4.5.6): add/remove server and change
//! priority are themselves Raft log entries. Adds/removes wait for the
//! new config to actually take effect by polling with exponential
//! backoff; removing the local leader yields leadership first so the
//! next leader can perform the removal.

use std::time::Duration;

use crucible_types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfChange {
    AddServer { node: NodeId, priority: u32 },
    RemoveServer { node: NodeId },
    ChangePriority { node: NodeId, priority: u32 },
}

/// Exponential backoff for "has the conf change I proposed actually
/// landed in the cluster config yet" polling, capped by `max_attempts`.
pub struct BackoffPoll {
    attempt: u32,
    max_attempts: u32,
    base: Duration,
    cap: Duration,
}

impl BackoffPoll {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        BackoffPoll { attempt: 0, max_attempts, base, cap }
    }

    /// Returns the delay before the next poll, or `None` once
    /// `max_attempts` is exhausted (the caller should give up and fail
    /// the conf change).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let scaled = self.base.saturating_mul(1u32.checked_shl(self.attempt).unwrap_or(u32::MAX));
        self.attempt += 1;
        Some(scaled.min(self.cap))
    }
}

/// Whether `change` targets the node currently holding leadership,
/// meaning it must yield before the removal can proceed (§4.5.6: "If the
/// target of a remove is the local leader, the node yields leadership").
pub fn requires_leadership_yield(change: &ConfChange, local_leader: NodeId) -> bool {
    matches!(change, ConfChange::RemoveServer { node } if *node == local_leader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_attempt_up_to_the_cap() {
        let mut backoff = BackoffPoll::new(10, Duration::from_millis(10), Duration::from_millis(100));
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert_eq!(delays[2], Duration::from_millis(40));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(100)));
    }

    #[test]
    fn backoff_gives_up_after_max_attempts() {
        let mut backoff = BackoffPoll::new(2, Duration::from_millis(1), Duration::from_millis(10));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn remove_of_the_local_leader_requires_a_yield() {
        let leader = NodeId::new(1);
        assert!(requires_leadership_yield(&ConfChange::RemoveServer { node: leader }, leader));
        assert!(!requires_leadership_yield(&ConfChange::RemoveServer { node: NodeId::new(2) }, leader));
        assert!(!requires_leadership_yield(&ConfChange::AddServer { node: leader, priority: 1 }, leader));
    }
}
