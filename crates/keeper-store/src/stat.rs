//! Per-node metadata returned alongside every read and bumped by every
//! write (§4.5.1).

/// Mirrors ZooKeeper's `Stat` structure field-for-field so wire responses
/// need no reshaping at the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// zxid of the transaction that created this node.
    pub czxid: i64,
    /// zxid of the transaction that last modified this node's data.
    pub mzxid: i64,
    pub ctime: i64,
    pub mtime: i64,
    /// Number of times this node's data has changed.
    pub version: i32,
    /// Number of times this node's children have changed.
    pub cversion: i32,
    /// Number of times this node's ACL has changed.
    pub aversion: i32,
    /// Owning session id, or 0 for a persistent node.
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    /// zxid of the transaction that last modified this node's children.
    pub pzxid: i64,
}

impl Stat {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}
