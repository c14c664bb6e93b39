//! Interned, reference-counted ACL lists (§4.5.1 `SetACL`/`GetACL`).
//!
//! Every node stores an [`AclId`] rather than its own `Vec<AclEntry>`; most
//! nodes in a real tree share one of a handful of distinct ACL lists
//! (`OPEN_ACL_UNSAFE`, a handful of per-tenant lists), so interning turns
//! most `SetACL`/create calls into a refcount bump instead of an
//! allocation. Mutation of the map holds one process-wide mutex (§5 "The
//! ACL map is process-wide, reference counted; mutation holds a single
//! mutex").

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AclEntry {
    pub scheme: String,
    pub id: String,
    pub perms: u32,
}

pub const PERM_READ: u32 = 1 << 0;
pub const PERM_WRITE: u32 = 1 << 1;
pub const PERM_CREATE: u32 = 1 << 2;
pub const PERM_DELETE: u32 = 1 << 3;
pub const PERM_ADMIN: u32 = 1 << 4;
pub const PERM_ALL: u32 = PERM_READ | PERM_WRITE | PERM_CREATE | PERM_DELETE | PERM_ADMIN;

pub type AclList = Vec<AclEntry>;

/// Returns the default, world-readable-and-writable ACL (ZooKeeper's
/// `OPEN_ACL_UNSAFE`).
pub fn open_acl_unsafe() -> AclList {
    vec![AclEntry {
        scheme: "world".to_owned(),
        id: "anyone".to_owned(),
        perms: PERM_ALL,
    }]
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AclId(u64);

struct Entry {
    list: AclList,
    refcount: u64,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<u64, Entry>,
    index: HashMap<AclList, u64>,
    next_id: u64,
}

/// The process-wide ACL intern table.
#[derive(Default)]
pub struct AclMap {
    inner: Mutex<Inner>,
}

impl AclMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `list`, bumping its refcount if already present.
    pub fn intern(&self, list: AclList) -> AclId {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.index.get(&list) {
            inner.by_id.get_mut(&id).expect("indexed id exists").refcount += 1;
            return AclId(id);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.index.insert(list.clone(), id);
        inner.by_id.insert(id, Entry { list, refcount: 1 });
        AclId(id)
    }

    /// Drops one reference; the entry is evicted once the refcount hits
    /// zero, matching "each node's ACL reference is released on node
    /// deletion or re-`SetACL`".
    pub fn release(&self, id: AclId) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.by_id.get_mut(&id.0) else {
            return;
        };
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let list = inner.by_id.remove(&id.0).expect("just matched").list;
            inner.index.remove(&list);
        }
    }

    pub fn get(&self, id: AclId) -> Option<AclList> {
        self.inner.lock().by_id.get(&id.0).map(|e| e.list.clone())
    }

    /// Dumps every interned entry as `(id, list, refcount)`, for the ACL
    /// snapshot object (§4.5.5, "last (if version ≥ V1) = ACL map").
    pub fn snapshot(&self) -> Vec<(u64, AclList, u64)> {
        let inner = self.inner.lock();
        inner.by_id.iter().map(|(&id, e)| (id, e.list.clone(), e.refcount)).collect()
    }

    /// Rebuilds an interned table from a prior [`snapshot`] dump.
    pub fn from_snapshot(entries: Vec<(u64, AclList, u64)>) -> Self {
        let mut inner = Inner::default();
        for (id, list, refcount) in entries {
            inner.next_id = inner.next_id.max(id + 1);
            inner.index.insert(list.clone(), id);
            inner.by_id.insert(id, Entry { list, refcount });
        }
        AclMap { inner: Mutex::new(inner) }
    }

    pub fn id_for(&self, list: &AclList) -> Option<AclId> {
        self.inner.lock().index.get(list).copied().map(AclId)
    }
}

impl AclId {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        AclId(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_lists_intern_to_the_same_id_and_refcount() {
        let map = AclMap::new();
        let a = map.intern(open_acl_unsafe());
        let b = map.intern(open_acl_unsafe());
        assert_eq!(a, b);
        map.release(a);
        assert!(map.get(b).is_some());
        map.release(b);
        assert!(map.get(b).is_none());
    }

    #[test]
    fn distinct_lists_get_distinct_ids() {
        let map = AclMap::new();
        let a = map.intern(open_acl_unsafe());
        let b = map.intern(vec![AclEntry {
            scheme: "digest".to_owned(),
            id: "user:pw".to_owned(),
            perms: PERM_READ,
        }]);
        assert_ne!(a, b);
    }
}
