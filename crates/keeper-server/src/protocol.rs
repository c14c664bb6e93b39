//! ZooKeeper 3.x compatible request/response framing (§6 "Keeper wire
//! protocol"). Every request and response starts with an `(xid: i32,
//! OpNum: i32)` pair; everything after that is op-specific. Multi-byte
//! integers are big-endian (ZooKeeper's Jute encoding), unlike the
//! little-endian on-disk formats used elsewhere in this workspace.

use bytes::{Buf, BufMut};

use crucible_errors::{Code, Error, Result, ZkCode};
use crucible_keeper_store::acl::open_acl_unsafe;
use crucible_keeper_store::{AclEntry, AclList, Op, OpResponse, Stat};

/// Request opcodes, transcribed from ZooKeeper's own `ZooDefs.OpCode`
/// table so a wire-compatible client's request bytes decode here
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpNum {
    Notification = 0,
    Create = 1,
    Delete = 2,
    Exists = 3,
    GetData = 4,
    SetData = 5,
    GetAcl = 6,
    SetAcl = 7,
    GetChildren = 8,
    Sync = 9,
    Ping = 11,
    GetChildren2 = 12,
    Check = 13,
    Multi = 14,
    Auth = 100,
    SetWatches = 101,
    CreateSession = -10,
    CloseSession = -11,
}

impl OpNum {
    pub fn from_i32(value: i32) -> Result<Self> {
        Ok(match value {
            0 => OpNum::Notification,
            1 => OpNum::Create,
            2 => OpNum::Delete,
            3 => OpNum::Exists,
            4 => OpNum::GetData,
            5 => OpNum::SetData,
            6 => OpNum::GetAcl,
            7 => OpNum::SetAcl,
            8 => OpNum::GetChildren,
            9 => OpNum::Sync,
            11 => OpNum::Ping,
            12 => OpNum::GetChildren2,
            13 => OpNum::Check,
            14 => OpNum::Multi,
            100 => OpNum::Auth,
            101 => OpNum::SetWatches,
            -10 => OpNum::CreateSession,
            -11 => OpNum::CloseSession,
            other => return Err(Error::user(Code::UnsupportedParameter, format!("unknown OpNum {other}"))),
        })
    }
}

/// A watch notification's `type` field (§6: "watch notifications carry
/// xid = -1, zxid = -1 ... type in {CREATED, DELETED, CHANGED, CHILD}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WatchType {
    Created = 1,
    Deleted = 2,
    Changed = 3,
    Child = 4,
}

impl From<crucible_keeper_store::WatchEventType> for WatchType {
    fn from(value: crucible_keeper_store::WatchEventType) -> Self {
        use crucible_keeper_store::WatchEventType as E;
        match value {
            E::Created => WatchType::Created,
            E::Deleted => WatchType::Deleted,
            E::Changed => WatchType::Changed,
            E::Child => WatchType::Child,
        }
    }
}

pub const STATE_CONNECTED: i32 = 3;

fn put_string(buf: &mut impl BufMut, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut impl Buf) -> Result<String> {
    let len = get_nullable_len(buf)?;
    let Some(len) = len else {
        return Ok(String::new());
    };
    require(buf, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::user(Code::SyntaxError, "request string is not valid utf-8"))
}

fn put_bytes(buf: &mut impl BufMut, data: &[u8]) {
    buf.put_i32(data.len() as i32);
    buf.put_slice(data);
}

fn get_bytes(buf: &mut impl Buf) -> Result<Vec<u8>> {
    let len = get_nullable_len(buf)?;
    let Some(len) = len else {
        return Ok(Vec::new());
    };
    require(buf, len)?;
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

fn get_nullable_len(buf: &mut impl Buf) -> Result<Option<usize>> {
    require(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        Ok(None)
    } else {
        Ok(Some(len as usize))
    }
}

fn require(buf: &impl Buf, bytes: usize) -> Result<()> {
    if buf.remaining() < bytes {
        Err(Error::user(Code::UnexpectedEndOfFile, "truncated request"))
    } else {
        Ok(())
    }
}

fn put_acl(buf: &mut impl BufMut, acl: &AclList) {
    buf.put_i32(acl.len() as i32);
    for entry in acl {
        buf.put_u32(entry.perms);
        put_string(buf, &entry.scheme);
        put_string(buf, &entry.id);
    }
}

fn get_acl(buf: &mut impl Buf) -> Result<AclList> {
    require(buf, 4)?;
    let count = buf.get_i32();
    let mut acl = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        require(buf, 4)?;
        let perms = buf.get_u32();
        let scheme = get_string(buf)?;
        let id = get_string(buf)?;
        acl.push(AclEntry { scheme, id, perms });
    }
    Ok(acl)
}

pub fn put_stat(buf: &mut impl BufMut, stat: &Stat) {
    buf.put_i64(stat.czxid);
    buf.put_i64(stat.mzxid);
    buf.put_i64(stat.ctime);
    buf.put_i64(stat.mtime);
    buf.put_i32(stat.version);
    buf.put_i32(stat.cversion);
    buf.put_i32(stat.aversion);
    buf.put_i64(stat.ephemeral_owner);
    buf.put_i32(stat.data_length);
    buf.put_i32(stat.num_children);
    buf.put_i64(stat.pzxid);
}

/// Optional version, encoded as ZooKeeper does: any version
/// `< 0` means "no check" (`Op::Check`/`Op::Set` etc. take `Option<i32>`).
fn decode_version(raw: i32) -> Option<i32> {
    if raw < 0 {
        None
    } else {
        Some(raw)
    }
}

fn encode_version(version: Option<i32>) -> i32 {
    version.unwrap_or(-1)
}

/// Decodes a request body into the [`Op`] it lowers to. `watch` requests
/// carrying the boolean is read straight off the wire; `path` is always
/// the first field for path-addressed ops, matching §4.5.1's layout.
pub fn decode_request(op_num: OpNum, buf: &mut impl Buf) -> Result<Op> {
    match op_num {
        OpNum::Ping => Ok(Op::Heartbeat),
        OpNum::Sync => Ok(Op::Sync { path: get_string(buf)? }),
        OpNum::Create => {
            let path = get_string(buf)?;
            let data = get_bytes(buf)?;
            let acl = get_acl(buf)?;
            require(buf, 4)?;
            let flags = buf.get_i32();
            Ok(Op::Create {
                path,
                data,
                acl,
                ephemeral: flags & 0x1 != 0,
                sequential: flags & 0x2 != 0,
            })
        }
        OpNum::Delete => {
            let path = get_string(buf)?;
            require(buf, 4)?;
            Ok(Op::Remove { path, version: decode_version(buf.get_i32()) })
        }
        OpNum::Exists => {
            let path = get_string(buf)?;
            require(buf, 1)?;
            Ok(Op::Exists { path, watch: buf.get_u8() != 0 })
        }
        OpNum::GetData => {
            let path = get_string(buf)?;
            require(buf, 1)?;
            Ok(Op::Get { path, watch: buf.get_u8() != 0 })
        }
        OpNum::SetData => {
            let path = get_string(buf)?;
            let data = get_bytes(buf)?;
            require(buf, 4)?;
            Ok(Op::Set { path, data, version: decode_version(buf.get_i32()) })
        }
        OpNum::GetChildren => {
            let path = get_string(buf)?;
            require(buf, 1)?;
            let watch = buf.get_u8() != 0;
            if watch {
                Ok(Op::List { path, watch: true })
            } else {
                Ok(Op::SimpleList { path })
            }
        }
        OpNum::GetChildren2 => {
            let path = get_string(buf)?;
            require(buf, 1)?;
            Ok(Op::List { path, watch: buf.get_u8() != 0 })
        }
        OpNum::Check => {
            let path = get_string(buf)?;
            require(buf, 4)?;
            Ok(Op::Check { path, version: decode_version(buf.get_i32()) })
        }
        OpNum::SetAcl => {
            let path = get_string(buf)?;
            let acl = get_acl(buf)?;
            require(buf, 4)?;
            Ok(Op::SetACL { path, acl, version: decode_version(buf.get_i32()) })
        }
        OpNum::GetAcl => Ok(Op::GetACL { path: get_string(buf)? }),
        OpNum::Auth => Ok(Op::Auth { scheme: get_string(buf)?, credential: get_string(buf)? }),
        OpNum::CloseSession => Ok(Op::Close),
        OpNum::CreateSession => {
            require(buf, 8)?;
            Ok(Op::NewSession { timeout_ms: buf.get_i64() })
        }
        OpNum::Multi => {
            require(buf, 4)?;
            let count = buf.get_i32();
            let mut sub_ops = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                require(buf, 4)?;
                let sub_op_num = OpNum::from_i32(buf.get_i32())?;
                sub_ops.push(decode_request(sub_op_num, buf)?);
            }
            Ok(Op::Multi(sub_ops))
        }
        OpNum::SetWatches | OpNum::Notification => {
            Err(Error::user(Code::UnsupportedParameter, "not a client request opcode"))
        }
    }
}

/// `SetWatches` carries the relative paths a reconnecting client held
/// watches on before it disconnected (§7.3 supplement): a data-watch
/// path list followed by a list-watch (child) path list, each prefixed
/// by an `i32` count.
pub fn decode_set_watches(buf: &mut impl Buf) -> Result<(Vec<String>, Vec<String>)> {
    let data_watches = decode_path_list(buf)?;
    let list_watches = decode_path_list(buf)?;
    Ok((data_watches, list_watches))
}

fn decode_path_list(buf: &mut impl Buf) -> Result<Vec<String>> {
    require(buf, 4)?;
    let count = buf.get_i32();
    let mut paths = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        paths.push(get_string(buf)?);
    }
    Ok(paths)
}

/// Encodes a reply header plus `response`'s op-specific body.
pub fn encode_response(buf: &mut impl BufMut, xid: i32, zxid: i64, err: Option<ZkCode>, response: &OpResponse) {
    buf.put_i32(xid);
    buf.put_i64(zxid);
    buf.put_i32(err.map(|code| code.as_i32()).unwrap_or(0));
    if err.is_some() {
        return;
    }
    encode_body(buf, response);
}

fn encode_body(buf: &mut impl BufMut, response: &OpResponse) {
    match response {
        OpResponse::Heartbeat | OpResponse::Auth | OpResponse::Close => {}
        OpResponse::Sync { path } => put_string(buf, path),
        OpResponse::Create { path } => put_string(buf, path),
        OpResponse::Remove => {}
        OpResponse::Exists { stat } => {
            buf.put_u8(stat.is_some() as u8);
            if let Some(stat) = stat {
                put_stat(buf, stat);
            }
        }
        OpResponse::Get { data, stat } => {
            put_bytes(buf, data);
            put_stat(buf, stat);
        }
        OpResponse::List { children, stat } => {
            encode_path_list(buf, children);
            put_stat(buf, stat);
        }
        OpResponse::SimpleList { children } => encode_path_list(buf, children),
        OpResponse::Check => {}
        OpResponse::Set { stat } => put_stat(buf, stat),
        OpResponse::SetACL { stat } => put_stat(buf, stat),
        OpResponse::GetACL { acl, stat } => {
            put_acl(buf, acl);
            put_stat(buf, stat);
        }
        OpResponse::NewSession { session_id } => buf.put_i64(*session_id),
        OpResponse::UpdateSession { accepted } => buf.put_u8(*accepted as u8),
        OpResponse::Multi(responses) => {
            buf.put_i32(responses.len() as i32);
            for result in responses {
                match result {
                    Ok(inner) => {
                        buf.put_i32(0);
                        encode_body(buf, inner);
                    }
                    Err(error) => buf.put_i32(error.code()),
                }
            }
        }
    }
}

fn encode_path_list(buf: &mut impl BufMut, paths: &[String]) {
    buf.put_i32(paths.len() as i32);
    for path in paths {
        put_string(buf, path);
    }
}

/// Encodes a watch notification: `xid = -1`, `zxid = -1`, `state =
/// CONNECTED`, `type`, then the path the watch fired on (§6).
pub fn encode_notification(buf: &mut impl BufMut, watch_type: WatchType, path: &str) {
    buf.put_i32(-1);
    buf.put_i64(-1);
    buf.put_i32(0);
    buf.put_i32(watch_type as i32);
    buf.put_i32(STATE_CONNECTED);
    put_string(buf, path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn create_request_round_trips_flags() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "/a");
        put_bytes(&mut buf, b"hello");
        put_acl(&mut buf, &open_acl_unsafe());
        buf.put_i32(0x3);
        let op = decode_request(OpNum::Create, &mut buf).unwrap();
        match op {
            Op::Create { path, data, ephemeral, sequential, .. } => {
                assert_eq!(path, "/a");
                assert_eq!(data, b"hello");
                assert!(ephemeral);
                assert!(sequential);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn exists_response_encodes_absent_stat_as_zero_flag() {
        let mut buf = BytesMut::new();
        encode_response(&mut buf, 7, 42, None, &OpResponse::Exists { stat: None });
        let mut cursor = buf.freeze();
        assert_eq!(cursor.get_i32(), 7);
        assert_eq!(cursor.get_i64(), 42);
        assert_eq!(cursor.get_i32(), 0);
        assert_eq!(cursor.get_u8(), 0);
    }

    #[test]
    fn notification_carries_the_fixed_xid_and_zxid_sentinels() {
        let mut buf = BytesMut::new();
        encode_notification(&mut buf, WatchType::Changed, "/a");
        let mut cursor = buf.freeze();
        assert_eq!(cursor.get_i32(), -1);
        assert_eq!(cursor.get_i64(), -1);
    }
}
