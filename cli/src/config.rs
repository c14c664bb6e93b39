//! CLI defaults file (§9): `CRUCIBLE_CONFIG` (renamed from the original's
//! `CLICKHOUSE_CONFIG` — it is not this database), merged with `figment`
//! the same way `crucible-server`'s own configuration is, but scoped to
//! the handful of knobs a local-execution invocation can omit on the
//! command line.

use std::path::Path;

use figment::providers::{Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliDefaults {
    pub structure: Option<String>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
}

impl CliDefaults {
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let figment = Figment::from(Serialized::defaults(CliDefaults::default()));
        let figment = match path {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment,
        };
        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let defaults = CliDefaults::load(None).unwrap();
        assert_eq!(defaults.structure, None);
    }
}
