//! The op vocabulary and responses (§4.5.1 OpNum table). `Op` is what a
//! client request lowers to before being proposed through Raft; the state
//! machine only ever sees `Op`s that have already been committed.

use crate::acl::AclList;
use crate::stat::Stat;

#[derive(Debug, Clone)]
pub enum Op {
    Heartbeat,
    Sync { path: String },
    Create {
        path: String,
        data: Vec<u8>,
        acl: AclList,
        ephemeral: bool,
        sequential: bool,
    },
    Remove { path: String, version: Option<i32> },
    Exists { path: String, watch: bool },
    Get { path: String, watch: bool },
    List { path: String, watch: bool },
    SimpleList { path: String },
    Check { path: String, version: Option<i32> },
    Set {
        path: String,
        data: Vec<u8>,
        version: Option<i32>,
    },
    Multi(Vec<Op>),
    Auth { scheme: String, credential: String },
    Close,
    SetACL {
        path: String,
        acl: AclList,
        version: Option<i32>,
    },
    GetACL { path: String },
    NewSession { timeout_ms: i64 },
    UpdateSession { session_id: i64, timeout_ms: i64 },
}

impl Op {
    /// `shouldIncreaseZxid` (§4.5.4): only write ops allocate a zxid.
    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            Op::Get { .. }
                | Op::Exists { .. }
                | Op::Check { .. }
                | Op::Auth { .. }
                | Op::Heartbeat
                | Op::List { .. }
                | Op::SimpleList { .. }
                | Op::Sync { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum OpResponse {
    Heartbeat,
    Sync { path: String },
    Create { path: String },
    Remove,
    Exists { stat: Option<Stat> },
    Get { data: Vec<u8>, stat: Stat },
    List { children: Vec<String>, stat: Stat },
    SimpleList { children: Vec<String> },
    Check,
    Set { stat: Stat },
    Multi(Vec<crucible_errors::Result<OpResponse>>),
    Auth,
    Close,
    SetACL { stat: Stat },
    GetACL { acl: AclList, stat: Stat },
    NewSession { session_id: i64 },
    UpdateSession { accepted: bool },
}
