use std::{env, error::Error, path::PathBuf, sync::Arc, time::Duration};

use home::home_dir;
use log::debug;

use crate::{
    cache::DefaultRepositoryCacheManager, config::DepchainConfig, resolve::ResolveOptions,
    settings::Settings, Depchain,
};

pub const DEFAULT_MODULE_FILE_NAME: &str = "module.toml";
pub const DEFAULT_SETTINGS_FILE_NAME: &str = "depchain-settings.toml";

#[derive(Default)]
pub struct DepchainBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    module_file_name: Option<PathBuf>,
    settings_file_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    dynamic_ttl: Option<Duration>,
}

impl DepchainBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the module descriptor.
    ///
    /// Defaults to `module.toml`.
    pub fn module_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_file_name = Some(path.into());
        self
    }

    /// Resolver settings file.
    ///
    /// Defaults to `depchain-settings.toml` when it exists, otherwise a
    /// single file system repository under `repository/`.
    pub fn settings_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file_name = Some(path.into());
        self
    }

    /// Location of the repository cache.
    ///
    /// Defaults to `$HOME/.depchain/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// How long a dynamic revision stays resolved in the cache, overriding
    /// the settings.
    pub fn dynamic_ttl(mut self, ttl: Duration) -> Self {
        self.dynamic_ttl = Some(ttl);
        self
    }

    pub fn try_build(self) -> Result<Depchain, Box<dyn Error>> {
        let Self {
            root,
            module_file_name,
            settings_file_name,
            cache_directory_path,
            dynamic_ttl,
        } = self;
        let config = DepchainConfig::load()?;

        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let module_file_name =
            module_file_name.unwrap_or_else(|| PathBuf::from(DEFAULT_MODULE_FILE_NAME));

        let settings = match settings_file_name.or(config.settings_file) {
            Some(settings_file_name) => Settings::from_file(&root.join(settings_file_name))?,
            None => {
                let default_location = root.join(DEFAULT_SETTINGS_FILE_NAME);
                if default_location.exists() {
                    Settings::from_file(&default_location)?
                } else {
                    debug!("No settings file, using a file system repository under the root");
                    Settings::default().with_base_directory(&root)
                }
            }
        };

        let cache_directory = match cache_directory_path.or(config.cache_dir) {
            Some(path) => root.join(path),
            None => default_cache_directory()?,
        };
        let dynamic_ttl = dynamic_ttl
            .or(config.cache_ttl.map(Duration::from_secs))
            .unwrap_or_else(|| settings.dynamic_ttl());

        let cache = DefaultRepositoryCacheManager::new(cache_directory)?.with_dynamic_ttl(dynamic_ttl);

        let mut resolve_options = ResolveOptions::default();
        if let Some(check_modified) = config.check_modified {
            resolve_options = resolve_options.with_check_modified(check_modified);
        }
        if let Some(halt_on_failure) = config.halt_on_failure {
            resolve_options = resolve_options.with_halt_on_failure(halt_on_failure);
        }

        Depchain::new(
            &settings,
            Arc::new(cache),
            resolve_options,
            root,
            module_file_name,
        )
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".depchain/cache");
    Ok(cache_directory)
}
