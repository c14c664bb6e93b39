//! Ties the wire protocol ([`crate::protocol`]) to the state machine
//! (`crucible_keeper_store::KeeperStore`) and the consensus layer
//! (`crucible_keeper_raft::RaftDriver`): a request decodes to an `Op`, is
//! proposed through Raft if this node is the leader (or forwarded to the
//! leader otherwise), and the committed entry is applied to the store and
//! framed back into a response.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use crucible_errors::{Error, Result, ZkCode};
use crucible_keeper_raft::{CommittedEntry, LeaderForwarder, RaftDriver, Role};
use crucible_keeper_store::{KeeperStore, Op};
use crucible_types::SessionId;

use crate::protocol::{self, OpNum};
use crate::watch_registry::WatchRegistry;

pub struct KeeperServer {
    store: KeeperStore,
    raft: Arc<RaftDriver>,
    forwarder: Arc<dyn LeaderForwarder>,
    watches: Arc<WatchRegistry>,
}

impl KeeperServer {
    /// Builds a server and wires `store`'s fired watch events straight
    /// into the per-connection registry, so a watch registered over the
    /// wire protocol actually reaches its client once it fires.
    pub fn new(store: KeeperStore, raft: Arc<RaftDriver>, forwarder: Arc<dyn LeaderForwarder>) -> Self {
        let watches = Arc::new(WatchRegistry::new());
        let sink = watches.clone();
        store.set_watch_sink(Arc::new(move |events| sink.deliver(&events)));
        KeeperServer { store, raft, forwarder, watches }
    }

    pub fn store(&self) -> &KeeperStore {
        &self.store
    }

    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// Handles one framed request: decodes it, drives it through consensus,
    /// applies it to the state machine, and returns the encoded response
    /// frame (always `Ok` at this layer — op-level failures are encoded as
    /// a ZK error code in the reply header, not surfaced as a transport
    /// error).
    pub async fn handle_frame(&self, session: SessionId, xid: i32, op_num_raw: i32, mut body: BytesMut, now_ms: i64) -> Result<BytesMut> {
        let op_num = OpNum::from_i32(op_num_raw)?;

        if op_num == OpNum::SetWatches {
            let (data_paths, list_paths) = protocol::decode_set_watches(&mut body)?;
            self.watches.restore(&self.store, session, &data_paths, &list_paths);
            let mut out = BytesMut::new();
            out.put_i32(xid);
            out.put_i64(self.store.zxid_for(&Op::Heartbeat).get());
            out.put_i32(0);
            return Ok(out);
        }

        let op = protocol::decode_request(op_num, &mut body)?;
        let encoded = encode_op(&op);

        let committed = if self.raft.role() == Role::Leader {
            self.raft.propose(session, encoded, now_ms).await?
        } else {
            let leader = self.raft.current_leader().ok_or_else(|| Error::ConsensusError("no known leader".to_owned()))?;
            let reply = self.forwarder.forward(leader, session, encoded).await?;
            CommittedEntry { idx: 0, term: 0, session, body: reply, create_time: now_ms }
        };

        tracing::trace!(xid, idx = committed.idx, "applying committed keeper entry");
        self.apply_committed(xid, committed)
    }

    /// Applies every entry the Raft driver has just reported committed
    /// (the apply-loop's job once `RaftDriver::record_peer_match` returns
    /// newly committed entries); only meaningful on the leader, since
    /// followers receive their committed entries the same way once this
    /// server wires in peer message delivery.
    pub fn apply_committed(&self, xid: i32, committed: CommittedEntry) -> Result<BytesMut> {
        let op = decode_op(&committed.body)?;
        let zxid = self.store.zxid_for(&op);
        let result = self.store.apply(committed.session, zxid, committed.create_time, &op);

        let mut out = BytesMut::new();
        match result {
            Ok(response) => {
                protocol::encode_response(&mut out, xid, zxid.get(), None, &response);
            }
            Err(error) => {
                let zk_code = match error {
                    Error::ZkError(code) => code,
                    _ => ZkCode::RuntimeInconsistency,
                };
                out.put_i32(xid);
                out.put_i64(zxid.get());
                out.put_i32(zk_code.as_i32());
            }
        }
        Ok(out)
    }
}

/// Opaque envelope an `Op` is reduced to before going through
/// `RaftDriver::propose`/the leader-forward channel: a length-prefixed
/// `(OpNum, body)` pair the Raft layer never interprets (§4.5.6).
fn encode_op(op: &Op) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_op(&mut buf, op);
    buf.to_vec()
}

fn decode_op(bytes: &[u8]) -> Result<Op> {
    let mut cursor = std::io::Cursor::new(bytes);
    read_op(&mut cursor)
}

fn write_op(buf: &mut BytesMut, op: &Op) {
    match op {
        Op::Heartbeat => buf.put_i32(OpNum::Ping as i32),
        Op::Sync { path } => {
            buf.put_i32(OpNum::Sync as i32);
            write_string(buf, path);
        }
        Op::Create { path, data, acl, ephemeral, sequential } => {
            buf.put_i32(OpNum::Create as i32);
            write_string(buf, path);
            write_bytes(buf, data);
            buf.put_i32(acl.len() as i32);
            for entry in acl {
                write_string(buf, &entry.scheme);
                write_string(buf, &entry.id);
                buf.put_u32(entry.perms);
            }
            buf.put_u8(*ephemeral as u8);
            buf.put_u8(*sequential as u8);
        }
        Op::Remove { path, version } => {
            buf.put_i32(OpNum::Delete as i32);
            write_string(buf, path);
            buf.put_i32(version.unwrap_or(-1));
        }
        Op::Exists { path, watch } => {
            buf.put_i32(OpNum::Exists as i32);
            write_string(buf, path);
            buf.put_u8(*watch as u8);
        }
        Op::Get { path, watch } => {
            buf.put_i32(OpNum::GetData as i32);
            write_string(buf, path);
            buf.put_u8(*watch as u8);
        }
        Op::List { path, watch } => {
            buf.put_i32(OpNum::GetChildren2 as i32);
            write_string(buf, path);
            buf.put_u8(*watch as u8);
        }
        Op::SimpleList { path } => {
            buf.put_i32(OpNum::GetChildren as i32);
            write_string(buf, path);
        }
        Op::Check { path, version } => {
            buf.put_i32(OpNum::Check as i32);
            write_string(buf, path);
            buf.put_i32(version.unwrap_or(-1));
        }
        Op::Set { path, data, version } => {
            buf.put_i32(OpNum::SetData as i32);
            write_string(buf, path);
            write_bytes(buf, data);
            buf.put_i32(version.unwrap_or(-1));
        }
        Op::Multi(sub_ops) => {
            buf.put_i32(OpNum::Multi as i32);
            buf.put_i32(sub_ops.len() as i32);
            for sub_op in sub_ops {
                write_op(buf, sub_op);
            }
        }
        Op::Auth { scheme, credential } => {
            buf.put_i32(OpNum::Auth as i32);
            write_string(buf, scheme);
            write_string(buf, credential);
        }
        Op::Close => buf.put_i32(OpNum::CloseSession as i32),
        Op::SetACL { path, acl, version } => {
            buf.put_i32(OpNum::SetAcl as i32);
            write_string(buf, path);
            buf.put_i32(acl.len() as i32);
            for entry in acl {
                write_string(buf, &entry.scheme);
                write_string(buf, &entry.id);
                buf.put_u32(entry.perms);
            }
            buf.put_i32(version.unwrap_or(-1));
        }
        Op::GetACL { path } => {
            buf.put_i32(OpNum::GetAcl as i32);
            write_string(buf, path);
        }
        Op::NewSession { timeout_ms } => {
            buf.put_i32(OpNum::CreateSession as i32);
            buf.put_i64(*timeout_ms);
        }
        Op::UpdateSession { session_id, timeout_ms } => {
            buf.put_i32(i32::MIN);
            buf.put_i64(*session_id);
            buf.put_i64(*timeout_ms);
        }
    }
}

fn read_op(cursor: &mut impl Buf) -> Result<Op> {
    let tag = cursor.get_i32();
    if tag == i32::MIN {
        let session_id = cursor.get_i64();
        let timeout_ms = cursor.get_i64();
        return Ok(Op::UpdateSession { session_id, timeout_ms });
    }
    let op_num = OpNum::from_i32(tag)?;
    Ok(match op_num {
        OpNum::Ping => Op::Heartbeat,
        OpNum::Sync => Op::Sync { path: read_string(cursor) },
        OpNum::Create => {
            let path = read_string(cursor);
            let data = read_bytes(cursor);
            let count = cursor.get_i32();
            let mut acl = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let scheme = read_string(cursor);
                let id = read_string(cursor);
                let perms = cursor.get_u32();
                acl.push(crucible_keeper_store::AclEntry { scheme, id, perms });
            }
            let ephemeral = cursor.get_u8() != 0;
            let sequential = cursor.get_u8() != 0;
            Op::Create { path, data, acl, ephemeral, sequential }
        }
        OpNum::Delete => Op::Remove { path: read_string(cursor), version: decode_version(cursor.get_i32()) },
        OpNum::Exists => Op::Exists { path: read_string(cursor), watch: cursor.get_u8() != 0 },
        OpNum::GetData => Op::Get { path: read_string(cursor), watch: cursor.get_u8() != 0 },
        OpNum::GetChildren2 => Op::List { path: read_string(cursor), watch: cursor.get_u8() != 0 },
        OpNum::GetChildren => Op::SimpleList { path: read_string(cursor) },
        OpNum::Check => Op::Check { path: read_string(cursor), version: decode_version(cursor.get_i32()) },
        OpNum::SetData => {
            let path = read_string(cursor);
            let data = read_bytes(cursor);
            Op::Set { path, data, version: decode_version(cursor.get_i32()) }
        }
        OpNum::Multi => {
            let count = cursor.get_i32();
            let mut sub_ops = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                sub_ops.push(read_op(cursor)?);
            }
            Op::Multi(sub_ops)
        }
        OpNum::Auth => Op::Auth { scheme: read_string(cursor), credential: read_string(cursor) },
        OpNum::CloseSession => Op::Close,
        OpNum::SetAcl => {
            let path = read_string(cursor);
            let count = cursor.get_i32();
            let mut acl = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let scheme = read_string(cursor);
                let id = read_string(cursor);
                let perms = cursor.get_u32();
                acl.push(crucible_keeper_store::AclEntry { scheme, id, perms });
            }
            Op::SetACL { path, acl, version: decode_version(cursor.get_i32()) }
        }
        OpNum::GetAcl => Op::GetACL { path: read_string(cursor) },
        OpNum::CreateSession => Op::NewSession { timeout_ms: cursor.get_i64() },
        OpNum::SetWatches | OpNum::Notification => {
            return Err(Error::user(crucible_errors::Code::UnsupportedParameter, "not an encodable op"));
        }
    })
}

fn decode_version(raw: i32) -> Option<i32> {
    if raw < 0 {
        None
    } else {
        Some(raw)
    }
}

fn write_string(buf: &mut BytesMut, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

fn read_string(cursor: &mut impl Buf) -> String {
    let len = cursor.get_i32() as usize;
    let mut bytes = vec![0u8; len];
    cursor.copy_to_slice(&mut bytes);
    String::from_utf8_lossy(&bytes).into_owned()
}

fn write_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_i32(data.len() as i32);
    buf.put_slice(data);
}

fn read_bytes(cursor: &mut impl Buf) -> Vec<u8> {
    let len = cursor.get_i32() as usize;
    let mut data = vec![0u8; len];
    cursor.copy_to_slice(&mut data);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    use crucible_keeper_raft::{FsyncPolicy, NoForwarder};

    fn server() -> KeeperServer {
        let dir = tempfile::tempdir().unwrap();
        let raft = StdArc::new(
            RaftDriver::bootstrap_leader(crucible_types::NodeId::new(1), Vec::new(), dir.path(), FsyncPolicy::Sync).unwrap(),
        );
        KeeperServer::new(KeeperStore::new(4), raft, StdArc::new(NoForwarder))
    }

    #[test]
    fn an_op_round_trips_through_the_opaque_wire_envelope() {
        let op = Op::Create {
            path: "/a".to_owned(),
            data: b"hi".to_vec(),
            acl: crucible_keeper_store::acl::open_acl_unsafe(),
            ephemeral: false,
            sequential: true,
        };
        let encoded = encode_op(&op);
        let decoded = decode_op(&encoded).unwrap();
        match decoded {
            Op::Create { path, sequential, .. } => {
                assert_eq!(path, "/a");
                assert!(sequential);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_new_session_proposal_commits_and_applies_on_a_single_node() {
        let server = server();
        let op = Op::NewSession { timeout_ms: 30_000 };
        let committed = server.raft.propose(SessionId::INVALID, encode_op(&op), 0).await.unwrap();
        let response = server.apply_committed(1, committed).unwrap();
        let mut cursor = response.freeze();
        assert_eq!(cursor.get_i32(), 1);
    }
}
