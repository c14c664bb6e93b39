//! Build information

/// The version of crucible-cli.
pub const CRUCIBLE_CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CRUCIBLE_CLI_VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
pub const CRUCIBLE_CLI_VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
pub const CRUCIBLE_CLI_VERSION_PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");
/// Pre-release version of crucible.
pub const CRUCIBLE_CLI_VERSION_PRE: &str = env!("CARGO_PKG_VERSION_PRE");
