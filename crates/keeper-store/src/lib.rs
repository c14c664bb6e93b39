//! The Keeper state machine (§4.5): a ZooKeeper-compatible hierarchical
//! key/value store with ephemeral nodes, sequential nodes, watches, ACLs,
//! and multi-operation atomicity. Every mutation here is assumed to have
//! already been committed by Raft — this crate owns no consensus logic of
//! its own (that's `crucible-keeper-raft`).
//!
//! [`KeeperStore`] ties together the node tree ([`container`]), the
//! interned ACL table ([`acl`]), the watch tables ([`watches`]), and the
//! session table ([`session`]) behind one `apply(Op) -> OpResponse` entry
//! point.

pub mod acl;
pub mod container;
pub mod ops;
pub mod session;
pub mod snapshot;
pub mod stat;
pub mod store;
pub mod watches;

pub use acl::{AclEntry, AclId, AclList, AclMap};
pub use container::{Node, StripedContainer, DEFAULT_BLOCK_COUNT};
pub use ops::{Op, OpResponse};
pub use session::{SessionInfo, SessionTable};
pub use snapshot::{load_snapshot, write_snapshot, SnapshotError};
pub use stat::Stat;
pub use store::KeeperStore;
pub use watches::{WatchEvent, WatchEventType, WatchTables};
