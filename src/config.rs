use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Defaults taken from `DEPCHAIN_*` environment variables.
pub struct DepchainConfig {
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl: Option<u64>,
    pub settings_file: Option<PathBuf>,
    pub check_modified: Option<bool>,
    pub halt_on_failure: Option<bool>,
}

impl DepchainConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            cache_ttl: raw_config.cache.ttl,
            settings_file: raw_config.settings.file,
            check_modified: raw_config.check.modified,
            halt_on_failure: raw_config.resolve.halt,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    settings: SettingsConfig,
    #[serde(default)]
    check: CheckConfig,
    #[serde(default)]
    resolve: ResolveConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
    ttl: Option<u64>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct SettingsConfig {
    file: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CheckConfig {
    modified: Option<bool>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ResolveConfig {
    halt: Option<bool>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("DEPCHAIN")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("DEPCHAIN_CACHE_DIR".to_owned(), "/cache".to_owned()),
            ("DEPCHAIN_CACHE_TTL".to_owned(), "300".to_owned()),
            ("DEPCHAIN_SETTINGS_FILE".to_owned(), "/etc/depchain.toml".to_owned()),
            ("DEPCHAIN_CHECK_MODIFIED".to_owned(), "true".to_owned()),
            ("DEPCHAIN_RESOLVE_HALT".to_owned(), "false".to_owned()),
        ]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/cache".into()),
                    ttl: Some(300),
                },
                settings: SettingsConfig {
                    file: Some("/etc/depchain.toml".into())
                },
                check: CheckConfig {
                    modified: Some(true)
                },
                resolve: ResolveConfig { halt: Some(false) },
            }
        )
    }
}
