use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonically increasing 64-bit Keeper transaction id (§3 "Zxid").
///
/// Every write assigns a new zxid; reads are served at a zxid greater than
/// or equal to the client's last observed zxid.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Zxid(i64);

impl Zxid {
    pub const ZERO: Zxid = Zxid(0);

    pub const fn new(value: i64) -> Self {
        Zxid(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Zxid {
        Zxid(self.0 + 1)
    }
}

impl fmt::Display for Zxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide zxid allocator. Only the Raft-committing leader advances
/// this; followers observe assigned zxids via the committed log (§4.5.4).
#[derive(Debug, Default)]
pub struct ZxidAllocator(AtomicI64);

impl ZxidAllocator {
    pub fn new(initial: Zxid) -> Self {
        Self(AtomicI64::new(initial.get()))
    }

    /// Allocates the next zxid. Only write operations call this
    /// (`shouldIncreaseZxid` in §4.5.4).
    pub fn allocate(&self) -> Zxid {
        Zxid(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Zxid {
        Zxid(self.0.load(Ordering::SeqCst))
    }
}

/// Keeper client session identifier, allocated by the Raft leader through
/// an append-entry (§4.5.3), never locally.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct SessionId(i64);

impl SessionId {
    pub const INVALID: SessionId = SessionId(0);

    pub const fn new(value: i64) -> Self {
        SessionId(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A cluster node identifier (used to address Raft peers and replicas for
/// parallel-replica sharding, §4.4.3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(value: u64) -> Self {
        NodeId(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// A MergeTree part name, unique within a table (§3 "MergeTree part").
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct PartId(pub String);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mark (granule) index within a part's per-column mark file (§3
/// "Granule / Mark").
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct MarkIndex(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zxid_allocator_is_monotonic() {
        let alloc = ZxidAllocator::new(Zxid::ZERO);
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert!(b > a);
        assert_eq!(alloc.current(), b);
    }
}
