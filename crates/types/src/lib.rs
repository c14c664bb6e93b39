//! Shared identifiers and ambient-stack plumbing (hot-reloadable
//! configuration, the uncompressed-block cache) used across every crucible
//! crate.

mod block_cache;
mod ids;
mod live;
mod version;

pub use block_cache::BlockCache;
pub use ids::{MarkIndex, NodeId, PartId, SessionId, Zxid};
pub use live::{BoxedLiveLoad, Live, Updateable};
pub use version::Version;
