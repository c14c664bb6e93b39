//! Error code namespace and the typed [`Error`] enum shared by every
//! crucible crate (§6/§7 of the specification).
//!
//! Codes in `[1..999]` are domain errors, transcribed verbatim from the
//! reference implementation's own numbering so that wire-compatible clients
//! can match on the same integers. Codes in `[1000..]` are categories that
//! bridge from external error providers (I/O, consensus, ZooKeeper).

use std::fmt;

/// Domain error codes, `[1..999]`. Only the subset actually raised by the
/// modules in this workspace is transcribed; the reference implementation's
/// full table is much larger and out of scope (§1 Non-goals).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i32)]
pub enum Code {
    UnsupportedParameter = 2,
    UnexpectedEndOfFile = 3,
    PositionOutOfBound = 11,
    CannotReadAllData = 33,
    ChecksumDoesntMatch = 40,
    NumberOfArgumentsDoesntMatch = 42,
    IllegalTypeOfArgument = 43,
    IllegalColumn = 44,
    LogicalError = 49,
    IllegalTypeOfColumnForFilter = 59,
    SyntaxError = 62,
    ArgumentOutOfBound = 69,
    CannotMergeDifferentAggregatedDataVariants = 94,
    TooMuchRows = 158,
    BadTypeOfField = 169,
    BadGet = 170,
    MemoryLimitExceeded = 241,
    NotEnoughSpace = 243,
    CorruptedData = 246,
}

impl Code {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_i32())
    }
}

/// ZooKeeper's own `Error` enum (§6), kept as negative codes for wire
/// compatibility with ZooKeeper 3.x clients.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i32)]
pub enum ZkCode {
    Ok = 0,
    RuntimeInconsistency = -2,
    ConnectionLoss = -4,
    OperationTimeout = -7,
    NoNode = -101,
    BadVersion = -103,
    NodeExists = -110,
    NotEmpty = -111,
}

impl ZkCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// The five broad error kinds named in §7, each carrying the originating
/// domain code or message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Programmer errors: unreachable in a correct build. Not retried.
    #[error("logical error [{code}]: {message}")]
    LogicError { code: Code, message: String },

    /// User input errors: query fails, other queries unaffected.
    #[error("user error [{code}]: {message}")]
    UserError { code: Code, message: String },

    /// I/O and corruption errors: the offending part is quarantined.
    #[error("io error [{code}]: {message}")]
    IoError { code: Code, message: String },

    /// Keeper consensus errors, propagated as a general server error.
    #[error("consensus error: {0}")]
    ConsensusError(String),

    /// ZooKeeper-shaped errors returned to Keeper clients.
    #[error("zk error [{0:?}]")]
    ZkError(ZkCode),
}

impl Error {
    pub fn logic(code: Code, message: impl Into<String>) -> Self {
        Error::LogicError {
            code,
            message: message.into(),
        }
    }

    pub fn user(code: Code, message: impl Into<String>) -> Self {
        Error::UserError {
            code,
            message: message.into(),
        }
    }

    pub fn io(code: Code, message: impl Into<String>) -> Self {
        Error::IoError {
            code,
            message: message.into(),
        }
    }

    /// The numeric code carried by this error, for wire responses.
    pub fn code(&self) -> i32 {
        match self {
            Error::LogicError { code, .. }
            | Error::UserError { code, .. }
            | Error::IoError { code, .. } => code.as_i32(),
            Error::ConsensusError(_) => 1000,
            Error::ZkError(zk) => zk.as_i32(),
        }
    }

    /// Whether this error class is safe to retry at the client (§7:
    /// Keeper-transient errors are idempotent-retryable, consensus/user/logic
    /// errors are not).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ZkError(ZkCode::ConnectionLoss) | Error::ZkError(ZkCode::OperationTimeout)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_reference_numbering() {
        assert_eq!(Code::IllegalColumn.as_i32(), 44);
        assert_eq!(Code::TooMuchRows.as_i32(), 158);
        assert_eq!(Code::ChecksumDoesntMatch.as_i32(), 40);
        assert_eq!(
            Code::CannotMergeDifferentAggregatedDataVariants.as_i32(),
            94
        );
    }

    #[test]
    fn zk_codes_are_zookeeper_compatible() {
        assert_eq!(ZkCode::Ok.as_i32(), 0);
        assert_eq!(ZkCode::NoNode.as_i32(), -101);
        assert_eq!(ZkCode::NodeExists.as_i32(), -110);
        assert_eq!(ZkCode::NotEmpty.as_i32(), -111);
    }

    #[test]
    fn connection_loss_is_retryable_but_logic_errors_are_not() {
        assert!(Error::ZkError(ZkCode::ConnectionLoss).is_retryable());
        assert!(!Error::logic(Code::LogicalError, "unreachable").is_retryable());
    }
}
