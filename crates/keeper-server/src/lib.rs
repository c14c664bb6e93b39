//! The ZooKeeper-compatible Keeper server (§7.3): wire framing
//! ([`protocol`]), per-connection watch delivery ([`watch_registry`]), and
//! the request dispatcher tying the wire protocol to
//! `crucible-keeper-store`'s state machine through `crucible-keeper-raft`'s
//! consensus layer ([`dispatch`]).

pub mod dispatch;
pub mod protocol;
pub mod watch_registry;

pub use dispatch::KeeperServer;
pub use protocol::{OpNum, WatchType, STATE_CONNECTED};
pub use watch_registry::{Notification, WatchRegistry};
