//! Object-addressed snapshots (§4.5.5): object 1 is `int_map` (the zxid
//! counter), objects `2..2+N_CONTAINER_BLOCKS` are the data container's
//! blocks, followed by the ephemerals map, the session+timeout map, and
//! (last) the ACL map. Objects are written to `snap_<zxid>/<obj_id>`
//! files so creation and transfer of independent objects can proceed in
//! parallel.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};

use crucible_types::{SessionId, Zxid};

use crate::acl::AclList;
use crate::container::Node;
use crate::session::SessionInfo;
use crate::stat::Stat;
use crate::store::KeeperStore;

/// The version byte written as the first byte of object 1, so a reader
/// knows whether to expect an ACL map object at the end.
pub const SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug)]
pub struct SnapshotState {
    pub zxid: Zxid,
    pub blocks: Vec<Vec<(String, Node)>>,
    pub sessions: Vec<(SessionId, SessionInfo)>,
    pub acl: Vec<(u64, AclList, u64)>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated or corrupt snapshot object: {0}")]
    Truncated(&'static str),
    #[error("no snapshot directories found under {0}")]
    NotFound(PathBuf),
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn get_bytes(buf: &mut impl Buf) -> Result<Vec<u8>, SnapshotError> {
    if buf.remaining() < 4 {
        return Err(SnapshotError::Truncated("length prefix"));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(SnapshotError::Truncated("payload"));
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn get_string(buf: &mut impl Buf) -> Result<String, SnapshotError> {
    String::from_utf8(get_bytes(buf)?).map_err(|_| SnapshotError::Truncated("utf8"))
}

fn put_stat(buf: &mut BytesMut, stat: &Stat) {
    buf.put_i64_le(stat.czxid);
    buf.put_i64_le(stat.mzxid);
    buf.put_i64_le(stat.ctime);
    buf.put_i64_le(stat.mtime);
    buf.put_i32_le(stat.version);
    buf.put_i32_le(stat.cversion);
    buf.put_i32_le(stat.aversion);
    buf.put_i64_le(stat.ephemeral_owner);
    buf.put_i32_le(stat.data_length);
    buf.put_i32_le(stat.num_children);
    buf.put_i64_le(stat.pzxid);
}

fn get_stat(buf: &mut impl Buf) -> Result<Stat, SnapshotError> {
    if buf.remaining() < 8 * 6 + 4 * 4 {
        return Err(SnapshotError::Truncated("stat"));
    }
    Ok(Stat {
        czxid: buf.get_i64_le(),
        mzxid: buf.get_i64_le(),
        ctime: buf.get_i64_le(),
        mtime: buf.get_i64_le(),
        version: buf.get_i32_le(),
        cversion: buf.get_i32_le(),
        aversion: buf.get_i32_le(),
        ephemeral_owner: buf.get_i64_le(),
        data_length: buf.get_i32_le(),
        num_children: buf.get_i32_le(),
        pzxid: buf.get_i64_le(),
    })
}

fn put_acl_list(buf: &mut BytesMut, acl: &AclList) {
    buf.put_u32_le(acl.len() as u32);
    for entry in acl {
        put_string(buf, &entry.scheme);
        put_string(buf, &entry.id);
        buf.put_u32_le(entry.perms);
    }
}

fn get_acl_list(buf: &mut impl Buf) -> Result<AclList, SnapshotError> {
    if buf.remaining() < 4 {
        return Err(SnapshotError::Truncated("acl list length"));
    }
    let count = buf.get_u32_le();
    (0..count)
        .map(|_| {
            Ok(crate::acl::AclEntry {
                scheme: get_string(buf)?,
                id: get_string(buf)?,
                perms: {
                    if buf.remaining() < 4 {
                        return Err(SnapshotError::Truncated("acl perms"));
                    }
                    buf.get_u32_le()
                },
            })
        })
        .collect()
}

fn object_1(zxid: Zxid, next_session_id: i64) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(SNAPSHOT_VERSION);
    buf.put_i64_le(zxid.get());
    buf.put_i64_le(next_session_id);
    buf
}

fn write_object(dir: &Path, id: u32, bytes: &[u8]) -> Result<(), SnapshotError> {
    fs::write(dir.join(id.to_string()), bytes)?;
    Ok(())
}

/// Writes every snapshot object for `store` under `root/snap_<zxid>/`.
pub fn write_snapshot(store: &KeeperStore, root: &Path) -> Result<PathBuf, SnapshotError> {
    let state = store.snapshot_state();
    let dir = root.join(format!("snap_{}", state.zxid.get()));
    fs::create_dir_all(&dir)?;

    let next_session_id = state.sessions.iter().map(|(id, _)| id.get()).max().unwrap_or(0) + 1;
    write_object(&dir, 1, &object_1(state.zxid, next_session_id))?;

    for (idx, block) in state.blocks.iter().enumerate() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(block.len() as u32);
        for (path, node) in block {
            put_string(&mut buf, path);
            put_bytes(&mut buf, &node.data);
            put_stat(&mut buf, &node.stat);
            buf.put_u64_le(node.acl.raw());
            buf.put_u32_le(node.children.len() as u32);
            for child in &node.children {
                put_string(&mut buf, child);
            }
        }
        write_object(&dir, 2 + idx as u32, &buf)?;
    }
    let ephemerals_id = 2 + state.blocks.len() as u32;

    let mut ephemerals_buf = BytesMut::new();
    let ephemeral_count: usize = state.sessions.iter().map(|(_, info)| info.ephemerals.len()).sum();
    ephemerals_buf.put_u32_le(ephemeral_count as u32);
    for (id, info) in &state.sessions {
        for path in &info.ephemerals {
            ephemerals_buf.put_i64_le(id.get());
            put_string(&mut ephemerals_buf, path);
        }
    }
    write_object(&dir, ephemerals_id, &ephemerals_buf)?;

    let sessions_id = ephemerals_id + 1;
    let mut sessions_buf = BytesMut::new();
    sessions_buf.put_u32_le(state.sessions.len() as u32);
    for (id, info) in &state.sessions {
        sessions_buf.put_i64_le(id.get());
        sessions_buf.put_i64_le(info.timeout_ms);
        sessions_buf.put_i64_le(info.last_heartbeat_ms);
    }
    write_object(&dir, sessions_id, &sessions_buf)?;

    let acl_id = sessions_id + 1;
    let mut acl_buf = BytesMut::new();
    acl_buf.put_u32_le(state.acl.len() as u32);
    for (id, list, refcount) in &state.acl {
        acl_buf.put_u64_le(*id);
        acl_buf.put_u64_le(*refcount);
        put_acl_list(&mut acl_buf, list);
    }
    write_object(&dir, acl_id, &acl_buf)?;

    Ok(dir)
}

/// Loads the newest `snap_<zxid>` directory under `root`. The caller is
/// responsible for replaying any log tail past the returned zxid.
pub fn load_snapshot(root: &Path) -> Result<SnapshotState, SnapshotError> {
    let newest = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let zxid = name.strip_prefix("snap_")?.parse::<i64>().ok()?;
            Some((zxid, e.path()))
        })
        .max_by_key(|(zxid, _)| *zxid)
        .ok_or_else(|| SnapshotError::NotFound(root.to_path_buf()))?;
    load_snapshot_dir(&newest.1)
}

fn load_snapshot_dir(dir: &Path) -> Result<SnapshotState, SnapshotError> {
    let mut obj1 = std::io::Cursor::new(fs::read(dir.join("1"))?);
    if obj1.remaining() < 1 {
        return Err(SnapshotError::Truncated("version byte"));
    }
    let version = obj1.get_u8();
    if obj1.remaining() < 16 {
        return Err(SnapshotError::Truncated("int_map"));
    }
    let zxid = Zxid::new(obj1.get_i64_le());
    let _next_session_id = obj1.get_i64_le();

    let mut blocks = Vec::new();
    let mut idx = 2u32;
    loop {
        let path = dir.join(idx.to_string());
        if !path.exists() {
            break;
        }
        let bytes = fs::read(&path)?;
        let mut cursor = std::io::Cursor::new(bytes);
        if cursor.remaining() < 4 {
            return Err(SnapshotError::Truncated("block entry count"));
        }
        let count = cursor.get_u32_le();
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let path = get_string(&mut cursor)?;
            let data = get_bytes(&mut cursor)?;
            let stat = get_stat(&mut cursor)?;
            if cursor.remaining() < 12 {
                return Err(SnapshotError::Truncated("acl id / child count"));
            }
            let acl_raw = cursor.get_u64_le();
            let child_count = cursor.get_u32_le();
            let mut children = std::collections::BTreeSet::new();
            for _ in 0..child_count {
                children.insert(get_string(&mut cursor)?);
            }
            entries.push((
                path,
                Node {
                    data,
                    stat,
                    acl: crate::acl::AclId::from_raw(acl_raw),
                    children,
                },
            ));
        }
        blocks.push(entries);
        idx += 1;
    }

    let ephemerals_path = dir.join(idx.to_string());
    let mut ephemerals: std::collections::HashMap<SessionId, std::collections::HashSet<String>> =
        std::collections::HashMap::new();
    if ephemerals_path.exists() {
        let bytes = fs::read(&ephemerals_path)?;
        let mut cursor = std::io::Cursor::new(bytes);
        if cursor.remaining() < 4 {
            return Err(SnapshotError::Truncated("ephemerals count"));
        }
        let count = cursor.get_u32_le();
        for _ in 0..count {
            if cursor.remaining() < 8 {
                return Err(SnapshotError::Truncated("ephemeral session id"));
            }
            let id = SessionId::new(cursor.get_i64_le());
            let path = get_string(&mut cursor)?;
            ephemerals.entry(id).or_default().insert(path);
        }
    }
    idx += 1;

    let sessions_path = dir.join(idx.to_string());
    let mut sessions = Vec::new();
    if sessions_path.exists() {
        let bytes = fs::read(&sessions_path)?;
        let mut cursor = std::io::Cursor::new(bytes);
        if cursor.remaining() < 4 {
            return Err(SnapshotError::Truncated("sessions count"));
        }
        let count = cursor.get_u32_le();
        for _ in 0..count {
            if cursor.remaining() < 24 {
                return Err(SnapshotError::Truncated("session entry"));
            }
            let id = SessionId::new(cursor.get_i64_le());
            let timeout_ms = cursor.get_i64_le();
            let last_heartbeat_ms = cursor.get_i64_le();
            sessions.push((
                id,
                SessionInfo {
                    timeout_ms,
                    last_heartbeat_ms,
                    ephemerals: ephemerals.remove(&id).unwrap_or_default(),
                    data_watches: Default::default(),
                    list_watches: Default::default(),
                    auth: Vec::new(),
                },
            ));
        }
    }
    idx += 1;

    let mut acl = Vec::new();
    if version >= SNAPSHOT_VERSION {
        let acl_path = dir.join(idx.to_string());
        if acl_path.exists() {
            let bytes = fs::read(&acl_path)?;
            let mut cursor = std::io::Cursor::new(bytes);
            if cursor.remaining() < 4 {
                return Err(SnapshotError::Truncated("acl count"));
            }
            let count = cursor.get_u32_le();
            for _ in 0..count {
                if cursor.remaining() < 16 {
                    return Err(SnapshotError::Truncated("acl entry header"));
                }
                let id = cursor.get_u64_le();
                let refcount = cursor.get_u64_le();
                let list = get_acl_list(&mut cursor)?;
                acl.push((id, list, refcount));
            }
        }
    }

    Ok(SnapshotState { zxid, blocks, sessions, acl })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Op;

    #[test]
    fn round_trips_nodes_sessions_and_acl_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeeperStore::new(4);

        let new_session = Op::NewSession { timeout_ms: 10_000 };
        let zxid = store.zxid_for(&new_session);
        let response = store.apply(SessionId::new(0), zxid, 0, &new_session).unwrap();
        let session = match response {
            crate::ops::OpResponse::NewSession { session_id } => SessionId::new(session_id),
            _ => unreachable!(),
        };

        let create = Op::Create {
            path: "/a".to_owned(),
            data: b"hello".to_vec(),
            acl: crate::acl::open_acl_unsafe(),
            ephemeral: true,
            sequential: false,
        };
        let zxid = store.zxid_for(&create);
        store.apply(session, zxid, 0, &create).unwrap();

        let snap_dir = write_snapshot(&store, dir.path()).unwrap();
        assert!(snap_dir.exists());

        let state = load_snapshot(dir.path()).unwrap();
        assert_eq!(state.zxid, store.snapshot_state().zxid);
        let restored = KeeperStore::from_snapshot_state(state);
        assert!(restored.container_contains("/a"));
    }
}
