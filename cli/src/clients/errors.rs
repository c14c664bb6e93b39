//! Errors a `RemoteClient` call can surface: a connection/IO failure, a
//! malformed response, or the server's own `Exception` packet carrying its
//! originating error code — distinct from [`crate::errors::CliError`]
//! because a remote exception's code doesn't need to round-trip through
//! `crucible_errors::Error` to reach the process exit code.

use std::fmt;

use crate::errors::{CliError, NETWORK_ERROR};

#[derive(Debug)]
pub enum ClientError {
    Connection(String),
    Protocol(String),
    Remote { code: i32, message: String },
}

impl ClientError {
    pub(crate) fn connect(error: std::io::Error) -> Self {
        ClientError::Connection(error.to_string())
    }

    pub(crate) fn protocol(error: crucible_errors::Error) -> Self {
        ClientError::Protocol(error.to_string())
    }

    pub(crate) fn protocol_message(message: String) -> Self {
        ClientError::Protocol(message)
    }

    pub(crate) fn remote(code: i32, message: String) -> Self {
        ClientError::Remote { code, message }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connection(message) => write!(f, "connection error: {message}"),
            ClientError::Protocol(message) => write!(f, "protocol error: {message}"),
            ClientError::Remote { code, message } => write!(f, "server error [{code}]: {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ClientError> for CliError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Connection(message) => CliError::new(NETWORK_ERROR, message),
            ClientError::Protocol(message) => CliError::new(NETWORK_ERROR, message),
            ClientError::Remote { code, message } => CliError::new(code, message),
        }
    }
}
