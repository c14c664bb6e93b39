//! Server configuration file: YAML, overridable by `CRUCIBLE_` prefixed
//! environment variables with `__` nesting (the teacher's own
//! `RESTATE_`-prefixed `Env::prefixed(...).split("__")` idiom,
//! `server/src/config.rs`), built with `derive_builder` defaults and
//! merged with `figment`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crucible_keeper_raft::FsyncPolicy;

/// # Crucible configuration file
///
/// Each entry can be overridden with an environment variable prefixed
/// `CRUCIBLE_`, nesting structs with `__` (double underscore) — e.g.
/// `keeper.listen_addr` becomes `CRUCIBLE_KEEPER__LISTEN_ADDR`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default)]
pub struct Configuration {
    pub node_id: u64,

    /// Grace period given to in-flight tasks when `TaskCenter::cancel_tasks`
    /// is called during shutdown.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_grace_period: Duration,

    /// Whether this node runs the Keeper metadata role (§7) in addition to
    /// the query-serving role. A cluster typically runs Keeper on a small
    /// odd-sized subset of its nodes.
    pub runs_metadata_role: bool,

    /// `tracing_subscriber::EnvFilter` directive string, overridable by the
    /// `RUST_LOG` environment variable regardless of the `CRUCIBLE_` prefix.
    pub observability_filter: String,

    pub keeper: KeeperOptions,
    pub query: QueryOptions,
    pub mergetree: MergeTreeOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            node_id: 1,
            shutdown_grace_period: Duration::from_secs(60),
            runs_metadata_role: true,
            observability_filter: "info".to_owned(),
            keeper: KeeperOptions::default(),
            query: QueryOptions::default(),
            mergetree: MergeTreeOptions::default(),
        }
    }
}

/// Options for the ZooKeeper-compatible Keeper server (§4.5/§7.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperOptions {
    pub listen_addr: String,
    pub data_dir: PathBuf,
    /// Addresses of the other nodes in this Keeper cluster, for Raft
    /// forwarding/replication. Empty means a single-node cluster.
    pub peers: Vec<String>,
    /// Number of striped container locks (§4.5.1 supplement); defaults to
    /// the snapshot format's `N_CONTAINER_BLOCKS`.
    pub container_block_count: usize,
    pub fsync_policy: FsyncPolicyConfig,
}

impl Default for KeeperOptions {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:2181".to_owned(),
            data_dir: PathBuf::from("./keeper-data"),
            peers: Vec::new(),
            container_block_count: crucible_keeper_store::DEFAULT_BLOCK_COUNT,
            fsync_policy: FsyncPolicyConfig::FsyncParallel,
        }
    }
}

/// A serializable mirror of `crucible_keeper_raft::FsyncPolicy` (that type
/// isn't `Serialize`/`Deserialize` itself, being an internal log-writer
/// knob rather than a wire type).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum FsyncPolicyConfig {
    Sync,
    FsyncParallel,
}

impl From<FsyncPolicyConfig> for FsyncPolicy {
    fn from(value: FsyncPolicyConfig) -> Self {
        match value {
            FsyncPolicyConfig::Sync => FsyncPolicy::Sync,
            FsyncPolicyConfig::FsyncParallel => FsyncPolicy::FsyncParallel,
        }
    }
}

/// Options for the query-serving listener (MergeTree read path +
/// aggregation, wired to the client wire protocol, §6/§8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub listen_addr: String,
    pub max_threads: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9000".to_owned(),
            max_threads: 4,
        }
    }
}

/// Options for the MergeTree read path's part-selection and scan tuning
/// knobs (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeTreeOptions {
    pub prewhere_max_columns: usize,
    pub prewhere_max_column_bytes_ratio: f64,
    pub min_marks_for_seek: usize,
    pub min_marks_for_concurrent_read: usize,
    pub min_marks_per_thread: usize,
}

impl Default for MergeTreeOptions {
    fn default() -> Self {
        Self {
            prewhere_max_columns: 1,
            prewhere_max_column_bytes_ratio: 0.2,
            min_marks_for_seek: 8,
            min_marks_for_concurrent_read: 24,
            min_marks_per_thread: 8,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct Error(#[from] figment::Error);

impl Configuration {
    /// Loads configuration from a TOML file with overrides from
    /// `CRUCIBLE_`-prefixed environment variables, layered on this type's
    /// `Default`.
    pub fn load<P: AsRef<Path>>(config_file: P) -> Result<Self, Error> {
        Self::load_with_default(Configuration::default(), Some(config_file.as_ref()))
    }

    pub fn load_with_default(
        default_configuration: Configuration,
        config_file: Option<&Path>,
    ) -> Result<Self, Error> {
        let figment = Figment::from(Serialized::defaults(default_configuration));

        let figment = if let Some(config_file) = config_file {
            figment.merge(Yaml::file(config_file))
        } else {
            figment
        };

        let figment = figment
            .merge(Env::prefixed("CRUCIBLE_").split("__"))
            .merge(Env::raw().only(&["RUST_LOG"]).map(|_| "observability_filter".into()));

        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let config = Configuration::load_with_default(Configuration::default(), None).unwrap();
        assert_eq!(config.node_id, 1);
        assert_eq!(config.keeper.listen_addr, "127.0.0.1:2181");
    }

    #[test]
    fn env_override_takes_precedence_over_defaults() {
        std::env::set_var("CRUCIBLE_NODE_ID", "7");
        let config = Configuration::load_with_default(Configuration::default(), None).unwrap();
        std::env::remove_var("CRUCIBLE_NODE_ID");
        assert_eq!(config.node_id, 7);
    }
}
