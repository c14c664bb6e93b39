//! Forwarding a non-leader's client writes to the current leader over an
//! internal channel (§4.5.6). The teacher already wires exactly this kind
//! of internal server-to-server call through `tonic` +
//! `register_grpc_service` in `crates/metadata-store`; the transport is
//! represented here as a trait seam rather than a concrete generated gRPC
//! client so this crate doesn't depend on a `.proto` file and its
//! codegen, which this pass can't exercise without running the
//! toolchain (see DESIGN.md).
//!
//! The forwarded payload is the opaque, already-encoded request body —
//! this crate never interprets it, matching §4.5.6's "length-prefixed
//! `(session_id, request_body, create_time)` blobs; the state machine
//! deserializes per entry" (decoding is `crucible-keeper-server`'s job).

use async_trait::async_trait;

use crucible_errors::{Error, Result};
use crucible_types::{NodeId, SessionId};

#[async_trait]
pub trait LeaderForwarder: Send + Sync {
    async fn forward(&self, leader: NodeId, session: SessionId, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// Used in tests and single-node deployments: every call fails with a
/// consensus error, since there is nowhere to forward to.
pub struct NoForwarder;

#[async_trait]
impl LeaderForwarder for NoForwarder {
    async fn forward(&self, _leader: NodeId, _session: SessionId, _body: Vec<u8>) -> Result<Vec<u8>> {
        Err(Error::ConsensusError("no leader forwarder configured".to_owned()))
    }
}
