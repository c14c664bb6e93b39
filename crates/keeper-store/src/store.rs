//! `KeeperStore`: the top-level state machine glue (§4.5). Every mutating
//! [`Op`] arrives here only after it has been committed by Raft
//! (`crucible-keeper-raft` calls [`KeeperStore::apply`] from its apply
//! loop); reads may also be served here directly for linearizable-enough
//! local reads once `Sync` has established a barrier.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crucible_errors::{Code, Error, Result, ZkCode};
use crucible_types::{SessionId, Zxid, ZxidAllocator};

use crate::acl::{AclList, AclMap};
use crate::container::{join_child, split_path, Node, StripedContainer};
use crate::ops::{Op, OpResponse};
use crate::session::SessionTable;
use crate::snapshot::SnapshotState;
use crate::stat::Stat;
use crate::watches::{WatchEvent, WatchTables};

type WatchSink = Arc<dyn Fn(Vec<WatchEvent>) + Send + Sync>;

pub struct KeeperStore {
    container: StripedContainer,
    acl: AclMap,
    watches: Mutex<WatchTables>,
    sessions: Mutex<SessionTable>,
    zxid: ZxidAllocator,
    watch_sink: Mutex<Option<WatchSink>>,
}

impl KeeperStore {
    pub fn new(block_count: usize) -> Self {
        let acl = AclMap::new();
        let root_acl = acl.intern(crate::acl::open_acl_unsafe());
        KeeperStore {
            container: StripedContainer::new(block_count, root_acl),
            acl,
            watches: Mutex::new(WatchTables::new()),
            sessions: Mutex::new(SessionTable::new()),
            zxid: ZxidAllocator::new(Zxid::ZERO),
            watch_sink: Mutex::new(None),
        }
    }

    /// Registers the callback notified with every batch of watch events
    /// this store fires. `crucible-keeper-server` wires this to its
    /// per-connection watch registry so a fired watch actually reaches
    /// the client that registered it; without a sink, fired events are
    /// only traced.
    pub fn set_watch_sink(&self, sink: WatchSink) {
        *self.watch_sink.lock() = Some(sink);
    }

    /// Allocates a zxid for `op` if it mutates state, per §4.5.4.
    pub fn zxid_for(&self, op: &Op) -> Zxid {
        if op.mutates() {
            self.zxid.allocate()
        } else {
            self.zxid.current()
        }
    }

    pub fn expired_sessions(&self, now_ms: i64) -> Vec<SessionId> {
        self.sessions.lock().expired_as_of(now_ms)
    }

    /// Re-registers a watch without firing it, for a reconnecting
    /// client restoring its pre-disconnect watch set (§7.3 supplement).
    pub fn restore_data_watch(&self, path: &str, session: SessionId) {
        self.watches.lock().add_data_watch(path, session);
    }

    pub fn restore_list_watch(&self, path: &str, session: SessionId) {
        self.watches.lock().add_list_watch(path, session);
    }

    pub fn container_contains(&self, path: &str) -> bool {
        self.container.exists(path)
    }

    /// A shallow, consistent-enough snapshot of the whole state machine
    /// (§4.5.5), suitable for [`crate::snapshot::write_snapshot`].
    pub fn snapshot_state(&self) -> SnapshotState {
        SnapshotState {
            zxid: self.zxid.current(),
            blocks: self.container.snapshot_blocks(),
            sessions: self.sessions.lock().snapshot(),
            acl: self.acl.snapshot(),
        }
    }

    /// Rebuilds a store from a [`SnapshotState`] plus the log tail replay
    /// the caller performs afterward (§4.5.5: "load the newest snapshot's
    /// objects, then replay the log tail with `idx > snapshot_zxid`").
    pub fn from_snapshot_state(state: SnapshotState) -> Self {
        let acl = AclMap::from_snapshot(state.acl);
        KeeperStore {
            container: StripedContainer::from_blocks(state.blocks),
            acl,
            watches: Mutex::new(WatchTables::new()),
            sessions: Mutex::new(SessionTable::from_snapshot(state.sessions)),
            zxid: ZxidAllocator::new(state.zxid),
            watch_sink: Mutex::new(None),
        }
    }

    /// Applies one committed op against the state machine, firing any
    /// watches it triggers and returning the client-facing response.
    pub fn apply(&self, session: SessionId, zxid: Zxid, now_ms: i64, op: &Op) -> Result<OpResponse> {
        match op {
            Op::NewSession { timeout_ms } => {
                let id = self.sessions.lock().new_session(*timeout_ms, now_ms);
                Ok(OpResponse::NewSession { session_id: id.get() })
            }
            Op::UpdateSession { session_id, timeout_ms } => {
                let accepted = self
                    .sessions
                    .lock()
                    .reconnect(SessionId::new(*session_id), *timeout_ms, now_ms);
                Ok(OpResponse::UpdateSession { accepted })
            }
            Op::Heartbeat => {
                self.sessions.lock().heartbeat(session, now_ms);
                Ok(OpResponse::Heartbeat)
            }
            Op::Auth { scheme, credential } => {
                if let Some(info) = self.sessions.lock().get_mut(session) {
                    info.auth.push((scheme.clone(), credential.clone()));
                }
                Ok(OpResponse::Auth)
            }
            Op::Close => {
                self.close_session(session);
                Ok(OpResponse::Close)
            }
            Op::Multi(sub_ops) => self.apply_multi(session, zxid, now_ms, sub_ops),
            single => {
                let paths = required_paths(single);
                let mut txn = self.container.lock_for(paths.iter().map(String::as_str));
                let mut watches = self.watches.lock();
                let (response, events, _undo) = self.apply_one(&mut txn, &mut watches, session, zxid, now_ms, single)?;
                drop(txn);
                self.record_session_effect(session, single, &response);
                self.fire(events);
                Ok(response)
            }
        }
    }

    /// Keeps a session's "paths it holds watches on" / "ephemerals it
    /// owns" bookkeeping current so [`close_session`] can undo both in
    /// `O(watches_of_session)` without scanning the whole tree (§4.5.2).
    fn record_session_effect(&self, session: SessionId, op: &Op, response: &OpResponse) {
        let mut sessions = self.sessions.lock();
        let Some(info) = sessions.get_mut(session) else {
            return;
        };
        match (op, response) {
            (Op::Exists { path, watch: true }, _) | (Op::Get { path, watch: true }, _) => {
                info.data_watches.insert(path.clone());
            }
            (Op::List { path, watch: true }, _) => {
                info.list_watches.insert(path.clone());
            }
            (Op::Create { ephemeral: true, .. }, OpResponse::Create { path }) => {
                info.ephemerals.insert(path.clone());
            }
            _ => {}
        }
    }

    fn fire(&self, events: Vec<WatchEvent>) {
        if events.is_empty() {
            return;
        }
        for event in &events {
            tracing::trace!(session = %event.session, path = %event.path, ?event.event_type, "watch fired");
        }
        let sink = self.watch_sink.lock().clone();
        if let Some(sink) = sink {
            sink(events);
        }
    }

    fn close_session(&self, session: SessionId) {
        let info = self.sessions.lock().remove(session);
        let Some(info) = info else { return };
        let mut watches = self.watches.lock();
        watches.clear_session(session, &info.data_watches, &info.list_watches);
        for path in &info.ephemerals {
            if let Some((parent, _)) = split_path(path) {
                let mut txn = self.container.lock_for([parent, path.as_str()]);
                if txn.remove(path).is_some() {
                    txn.update(parent, |node| {
                        node.children.remove(path.rsplit('/').next().unwrap_or(path));
                        node.stat.cversion += 1;
                    });
                }
                drop(txn);
                let events = watches.fire_on_remove(path, parent);
                self.fire(events);
            }
        }
    }

    fn apply_multi(&self, session: SessionId, zxid: Zxid, now_ms: i64, sub_ops: &[Op]) -> Result<OpResponse> {
        let mut all_paths = HashSet::new();
        for op in sub_ops {
            for path in required_paths(op) {
                all_paths.insert(path);
            }
        }
        let mut txn = self.container.lock_for(all_paths.iter().map(String::as_str));
        let mut watches = self.watches.lock();

        let mut responses = Vec::with_capacity(sub_ops.len());
        let mut undos = Vec::new();
        let mut all_events = Vec::new();
        let mut failed_at = None;

        for (idx, op) in sub_ops.iter().enumerate() {
            match self.apply_one(&mut txn, &mut watches, session, zxid, now_ms, op) {
                Ok((response, events, undo)) => {
                    self.record_session_effect(session, op, &response);
                    responses.push(Ok(response));
                    all_events.extend(events);
                    undos.push(undo);
                }
                Err(error) => {
                    responses.push(Err(error));
                    failed_at = Some(idx);
                    break;
                }
            }
        }

        if failed_at.is_some() {
            for undo in undos.into_iter().rev() {
                undo.apply(&mut txn);
            }
            // §4.5.1: "remaining responses report ZRUNTIMEINCONSISTENCY".
            let failed_response = responses.pop().expect("at least the failing op was recorded");
            let mut final_responses: Vec<Result<OpResponse>> =
                (0..responses.len()).map(|_| Err(Error::ZkError(ZkCode::RuntimeInconsistency))).collect();
            final_responses.push(failed_response);
            drop(txn);
            return Ok(OpResponse::Multi(final_responses));
        }

        drop(txn);
        self.fire(all_events);
        Ok(OpResponse::Multi(responses))
    }

    /// Applies a single non-`Multi`, non-session op against an
    /// already-locked transaction, returning its response, the watch
    /// events it triggers, and an undo action a `Multi` can replay in
    /// reverse to unwind a partially-applied transaction.
    fn apply_one(
        &self,
        txn: &mut crate::container::Transaction<'_>,
        watches: &mut WatchTables,
        session: SessionId,
        zxid: Zxid,
        now_ms: i64,
        op: &Op,
    ) -> Result<(OpResponse, Vec<WatchEvent>, Undo)> {
        match op {
            Op::Sync { path } => Ok((OpResponse::Sync { path: path.clone() }, Vec::new(), Undo::none())),

            Op::Create { path, data, acl, ephemeral, sequential } => {
                let (parent_path, base_name) = split_path(path)
                    .ok_or_else(|| Error::user(Code::IllegalTypeOfArgument, "cannot create the root node"))?;
                let mut parent = txn
                    .get(parent_path)
                    .ok_or(Error::ZkError(ZkCode::NoNode))?;
                if parent.stat.is_ephemeral() {
                    return Err(Error::ZkError(ZkCode::NoNode));
                }
                let final_name = if *sequential {
                    format!("{base_name}{:010}", parent.stat.cversion)
                } else {
                    base_name.to_owned()
                };
                let final_path = join_child(parent_path, &final_name);
                if txn.get(&final_path).is_some() {
                    return Err(Error::ZkError(ZkCode::NodeExists));
                }

                let parent_before = parent.clone();
                parent.children.insert(final_name.clone());
                parent.stat.cversion += 1;
                parent.stat.pzxid = zxid.get();
                txn.update(parent_path, |node| *node = parent);

                let acl_id = self.acl.intern(acl.clone());
                let stat = Stat {
                    czxid: zxid.get(),
                    mzxid: zxid.get(),
                    ctime: now_ms,
                    mtime: now_ms,
                    version: 0,
                    cversion: 0,
                    aversion: 0,
                    ephemeral_owner: if *ephemeral { session.get() } else { 0 },
                    data_length: data.len() as i32,
                    num_children: 0,
                    pzxid: zxid.get(),
                };
                txn.insert(
                    final_path.clone(),
                    Node {
                        data: data.clone(),
                        stat,
                        acl: acl_id,
                        children: Default::default(),
                    },
                );

                let events = watches.fire_on_create(&final_path, parent_path);
                let undo = Undo {
                    actions: vec![
                        UndoAction::Restore(parent_path.to_owned(), Some(parent_before)),
                        UndoAction::Restore(final_path.clone(), None),
                    ],
                };
                Ok((OpResponse::Create { path: final_path }, events, undo))
            }

            Op::Remove { path, version } => {
                let (parent_path, base_name) =
                    split_path(path).ok_or_else(|| Error::user(Code::IllegalTypeOfArgument, "cannot remove the root node"))?;
                let node = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                if !node.children.is_empty() {
                    return Err(Error::ZkError(ZkCode::NotEmpty));
                }
                check_version(*version, node.stat.version)?;

                let parent_before = txn.get(parent_path);
                txn.update(parent_path, |p| {
                    p.children.remove(base_name);
                    p.stat.cversion += 1;
                    p.stat.pzxid = zxid.get();
                });
                let removed = txn.remove(path);
                self.acl.release(node.acl);

                let events = watches.fire_on_remove(path, parent_path);
                let undo = Undo {
                    actions: vec![
                        UndoAction::Restore(parent_path.to_owned(), parent_before),
                        UndoAction::Restore(path.clone(), removed),
                    ],
                };
                Ok((OpResponse::Remove, events, undo))
            }

            Op::Exists { path, watch } => {
                let node = txn.get(path);
                if *watch {
                    watches.add_data_watch(path, session);
                }
                Ok((OpResponse::Exists { stat: node.map(|n| n.stat) }, Vec::new(), Undo::none()))
            }

            Op::Get { path, watch } => {
                let node = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                if *watch {
                    watches.add_data_watch(path, session);
                }
                Ok((
                    OpResponse::Get { data: node.data, stat: node.stat },
                    Vec::new(),
                    Undo::none(),
                ))
            }

            Op::List { path, watch } => {
                let node = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                if *watch {
                    watches.add_list_watch(path, session);
                }
                let children = node.children.iter().cloned().collect();
                Ok((OpResponse::List { children, stat: node.stat }, Vec::new(), Undo::none()))
            }

            Op::SimpleList { path } => {
                let node = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                let children = node.children.iter().cloned().collect();
                Ok((OpResponse::SimpleList { children }, Vec::new(), Undo::none()))
            }

            Op::Check { path, version } => {
                let node = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                check_version(*version, node.stat.version)?;
                Ok((OpResponse::Check, Vec::new(), Undo::none()))
            }

            Op::Set { path, data, version } => {
                let before = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                check_version(*version, before.stat.version)?;
                let mut after_stat = before.stat;
                after_stat.version += 1;
                after_stat.mzxid = zxid.get();
                after_stat.mtime = now_ms;
                after_stat.data_length = data.len() as i32;
                txn.update(path, |node| {
                    node.data = data.clone();
                    node.stat = after_stat;
                });
                let events = watches.fire_on_set(path);
                let undo = Undo {
                    actions: vec![UndoAction::Restore(path.clone(), Some(before))],
                };
                Ok((OpResponse::Set { stat: after_stat }, events, undo))
            }

            Op::SetACL { path, acl, version } => {
                let before = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                check_version(*version, before.stat.version)?;
                let new_acl = self.acl.intern(acl.clone());
                let mut after_stat = before.stat;
                after_stat.aversion += 1;
                txn.update(path, |node| {
                    node.acl = new_acl;
                    node.stat = after_stat;
                });
                let undo = Undo {
                    actions: vec![UndoAction::Restore(path.clone(), Some(before))],
                };
                Ok((OpResponse::SetACL { stat: after_stat }, Vec::new(), undo))
            }

            Op::GetACL { path } => {
                let node = txn.get(path).ok_or(Error::ZkError(ZkCode::NoNode))?;
                let acl = self.acl.get(node.acl).unwrap_or_default();
                Ok((OpResponse::GetACL { acl, stat: node.stat }, Vec::new(), Undo::none()))
            }

            Op::Heartbeat | Op::Auth { .. } | Op::Close | Op::Multi(_) | Op::NewSession { .. } | Op::UpdateSession { .. } => Err(
                Error::user(Code::IllegalTypeOfArgument, "this op cannot appear inside a Multi"),
            ),
        }
    }
}

fn check_version(expected: Option<i32>, actual: i32) -> Result<()> {
    match expected {
        Some(v) if v != actual => Err(Error::ZkError(ZkCode::BadVersion)),
        _ => Ok(()),
    }
}

/// The paths a single op's locking needs to cover (parent + target, where
/// applicable), used to pick which container blocks a transaction must
/// write-lock before the op runs.
fn required_paths(op: &Op) -> Vec<String> {
    match op {
        Op::Create { path, .. } => {
            let mut paths = vec![path.clone()];
            if let Some((parent, _)) = split_path(path) {
                paths.push(parent.to_owned());
            }
            paths
        }
        Op::Remove { path, .. } | Op::Set { path, .. } | Op::SetACL { path, .. } => {
            let mut paths = vec![path.clone()];
            if let Some((parent, _)) = split_path(path) {
                paths.push(parent.to_owned());
            }
            paths
        }
        Op::Exists { path, .. }
        | Op::Get { path, .. }
        | Op::List { path, .. }
        | Op::SimpleList { path }
        | Op::Check { path, .. }
        | Op::GetACL { path } => vec![path.clone()],
        Op::Sync { path } => vec![path.clone()],
        Op::Multi(sub_ops) => sub_ops.iter().flat_map(required_paths).collect(),
        Op::Heartbeat | Op::Auth { .. } | Op::Close | Op::NewSession { .. } | Op::UpdateSession { .. } => Vec::new(),
    }
}

enum UndoAction {
    Restore(String, Option<Node>),
}

struct Undo {
    actions: Vec<UndoAction>,
}

impl Undo {
    fn none() -> Self {
        Undo { actions: Vec::new() }
    }

    fn apply(self, txn: &mut crate::container::Transaction<'_>) {
        for action in self.actions.into_iter().rev() {
            match action {
                UndoAction::Restore(path, Some(node)) => txn.insert(path, node),
                UndoAction::Restore(path, None) => {
                    txn.remove(&path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::open_acl_unsafe;

    fn create(store: &KeeperStore, session: SessionId, path: &str, data: &[u8], ephemeral: bool) -> OpResponse {
        let op = Op::Create {
            path: path.to_owned(),
            data: data.to_vec(),
            acl: open_acl_unsafe(),
            ephemeral,
            sequential: false,
        };
        let zxid = store.zxid_for(&op);
        store.apply(session, zxid, 0, &op).unwrap()
    }

    #[test]
    fn create_then_get_round_trips_data() {
        let store = KeeperStore::new(4);
        let session = SessionId::new(1);
        create(&store, session, "/a", b"hello", false);
        let op = Op::Get { path: "/a".to_owned(), watch: false };
        let zxid = store.zxid_for(&op);
        match store.apply(session, zxid, 0, &op).unwrap() {
            OpResponse::Get { data, .. } => assert_eq!(data, b"hello"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn create_on_existing_path_is_node_exists() {
        let store = KeeperStore::new(4);
        let session = SessionId::new(1);
        create(&store, session, "/a", b"1", false);
        let op = Op::Create {
            path: "/a".to_owned(),
            data: b"2".to_vec(),
            acl: open_acl_unsafe(),
            ephemeral: false,
            sequential: false,
        };
        let zxid = store.zxid_for(&op);
        let err = store.apply(session, zxid, 0, &op).unwrap_err();
        assert!(matches!(err, Error::ZkError(ZkCode::NodeExists)));
    }

    #[test]
    fn remove_non_empty_node_is_not_empty_error() {
        let store = KeeperStore::new(4);
        let session = SessionId::new(1);
        create(&store, session, "/a", b"1", false);
        create(&store, session, "/a/b", b"1", false);
        let op = Op::Remove { path: "/a".to_owned(), version: None };
        let zxid = store.zxid_for(&op);
        let err = store.apply(session, zxid, 0, &op).unwrap_err();
        assert!(matches!(err, Error::ZkError(ZkCode::NotEmpty)));
    }

    #[test]
    fn sequential_create_appends_zero_padded_cversion() {
        let store = KeeperStore::new(4);
        let session = SessionId::new(1);
        let op = Op::Create {
            path: "/seq-".to_owned(),
            data: Vec::new(),
            acl: open_acl_unsafe(),
            ephemeral: false,
            sequential: true,
        };
        let zxid = store.zxid_for(&op);
        match store.apply(session, zxid, 0, &op).unwrap() {
            OpResponse::Create { path } => assert_eq!(path, "/seq-0000000000"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn multi_rolls_back_all_effects_on_a_later_failure() {
        let store = KeeperStore::new(4);
        let session = SessionId::new(1);
        let op = Op::Multi(vec![
            Op::Create {
                path: "/a".to_owned(),
                data: Vec::new(),
                acl: open_acl_unsafe(),
                ephemeral: false,
                sequential: false,
            },
            Op::Remove { path: "/does-not-exist".to_owned(), version: None },
        ]);
        let zxid = store.zxid_for(&op);
        match store.apply(session, zxid, 0, &op).unwrap() {
            OpResponse::Multi(responses) => {
                assert!(responses[0].is_err());
                assert!(matches!(
                    responses[0],
                    Err(Error::ZkError(ZkCode::RuntimeInconsistency))
                ));
                assert!(responses[1].is_err());
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(!store.container.exists("/a"));
    }

    #[test]
    fn closing_a_session_removes_its_ephemerals_and_fires_watches() {
        let store = KeeperStore::new(4);
        let new_session = Op::NewSession { timeout_ms: 30_000 };
        let response = store.apply(SessionId::INVALID, store.zxid_for(&new_session), 0, &new_session).unwrap();
        let session = match response {
            OpResponse::NewSession { session_id } => SessionId::new(session_id),
            other => panic!("unexpected response: {other:?}"),
        };

        create(&store, session, "/e", b"1", true);
        let watch_op = Op::Exists { path: "/e".to_owned(), watch: true };
        store.apply(session, store.zxid_for(&watch_op), 0, &watch_op).unwrap();
        assert!(store.container.exists("/e"));

        let close = Op::Close;
        store.apply(session, store.zxid_for(&close), 0, &close).unwrap();
        assert!(!store.container.exists("/e"));
        assert!(!store.sessions.lock().contains(session));
    }
}
