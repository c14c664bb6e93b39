//! Consensus layer for the Keeper metadata service (§4.5.6): a durable,
//! segmented log ([`log`]), the `raft` crate's wire message type
//! ([`network`]), cluster membership changes ([`membership`]),
//! non-leader write forwarding ([`forward`]), and the commit pipeline
//! tying them together ([`driver`]).

pub mod driver;
pub mod forward;
pub mod log;
pub mod membership;
pub mod network;

pub use driver::{CommittedEntry, RaftDriver, Role};
pub use forward::{LeaderForwarder, NoForwarder};
pub use log::{FsyncPolicy, LogError, LogRecord, Segment};
pub use membership::{BackoffPoll, ConfChange};
pub use network::NetworkMessage;
