//! The CLI's own error type (§9): wraps either a `crucible_errors::Error`
//! raised during local execution or a raw code/message pair reported by a
//! remote server's `Exception` packet, so both paths feed the same
//! exit-code rule ("exit code equal to the last failed query's error
//! code").

use std::fmt;

/// ClickHouse's own `NETWORK_ERROR` code, kept for continuity with the
/// numbering `crucible-errors` otherwise transcribes verbatim, even though
/// connection failures never flow through that crate.
pub const NETWORK_ERROR: i32 = 210;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<crucible_errors::Error> for CliError {
    fn from(error: crucible_errors::Error) -> Self {
        Self { code: error.code(), message: error.to_string() }
    }
}

impl From<figment::Error> for CliError {
    fn from(error: figment::Error) -> Self {
        Self { code: crucible_errors::Code::SyntaxError.as_i32(), message: error.to_string() }
    }
}
