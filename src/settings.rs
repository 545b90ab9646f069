//! Resolver graph and resolution policies, read from a TOML settings file.
//!
//! ```toml
//! default_resolver = "main"
//! conflict_manager = "latest-revision"
//!
//! [[resolvers]]
//! kind = "filesystem"
//! name = "local"
//! root = "repository"
//!
//! [[resolvers]]
//! kind = "chain"
//! name = "main"
//! resolvers = ["local"]
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    cache::RepositoryCacheManager,
    latest::{latest_strategy, LatestRevisionStrategy, LatestStrategy},
    model::StatusManager,
    resolve::{conflict_manager, LatestConflictManager, ResolveEngine},
    resolver::{
        ChainResolver, DependencyResolver, DualResolver, FileSystemResolver, ResolveData,
        Transactional,
    },
    version::{version_matcher, ChainVersionMatcher, STANDARD_MATCHERS},
};

pub const DEFAULT_RESOLVER_NAME: &str = "local";
pub const DEFAULT_REPOSITORY_DIRECTORY: &str = "repository";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error reading settings {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unknown resolver `{0}`")]
    UnknownResolver(String),
    #[error("Resolver `{0}` is defined more than once")]
    DuplicateResolver(String),
    #[error("Resolver `{0}` depends on itself")]
    CircularResolver(String),
    #[error("Unknown latest strategy `{0}`")]
    UnknownLatestStrategy(String),
    #[error("Unknown version matcher `{0}`")]
    UnknownVersionMatcher(String),
    #[error("Unknown conflict manager `{0}`")]
    UnknownConflictManager(String),
    #[error("No resolver is configured")]
    NoResolver,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Resolver used for lookups. Defaults to the first one declared.
    #[serde(default)]
    pub default_resolver: Option<String>,
    #[serde(default = "default_latest_strategy")]
    pub latest_strategy: String,
    #[serde(default = "default_conflict_manager")]
    pub conflict_manager: String,
    /// Statuses from most to least mature.
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
    /// Matchers consulted, in order, to classify requested revisions.
    #[serde(default = "default_version_matchers")]
    pub version_matchers: Vec<String>,
    #[serde(default)]
    pub check_modified: bool,
    /// Seconds a dynamic revision keeps resolving to the same revision
    /// without asking the repositories.
    #[serde(default)]
    pub dynamic_ttl: u64,
    #[serde(default)]
    pub resolvers: Vec<ResolverSettings>,
    /// Directory relative resolver roots are resolved against.
    #[serde(skip)]
    pub base_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolverSettings {
    Filesystem {
        name: String,
        root: PathBuf,
        #[serde(default)]
        descriptor_patterns: Vec<String>,
        #[serde(default)]
        artifact_patterns: Vec<String>,
        #[serde(default)]
        transactional: Transactional,
        #[serde(default = "enabled")]
        check_consistency: bool,
        #[serde(default)]
        descriptor_required: bool,
    },
    Chain {
        name: String,
        resolvers: Vec<String>,
        #[serde(default)]
        return_first: bool,
        #[serde(default)]
        dual: bool,
        #[serde(default)]
        latest_strategy: Option<String>,
    },
    Dual {
        name: String,
        metadata: String,
        artifacts: String,
        #[serde(default)]
        allow_missing_descriptor: bool,
    },
}

impl ResolverSettings {
    pub fn name(&self) -> &str {
        match self {
            ResolverSettings::Filesystem { name, .. }
            | ResolverSettings::Chain { name, .. }
            | ResolverSettings::Dual { name, .. } => name,
        }
    }

    fn references(&self) -> Vec<&str> {
        match self {
            ResolverSettings::Filesystem { .. } => vec![],
            ResolverSettings::Chain { resolvers, .. } => {
                resolvers.iter().map(String::as_str).collect()
            }
            ResolverSettings::Dual {
                metadata,
                artifacts,
                ..
            } => vec![metadata.as_str(), artifacts.as_str()],
        }
    }
}

fn default_latest_strategy() -> String {
    LatestRevisionStrategy::NAME.to_string()
}

fn default_conflict_manager() -> String {
    LatestConflictManager::NAME.to_string()
}

fn default_statuses() -> Vec<String> {
    StatusManager::default().statuses().to_vec()
}

fn default_version_matchers() -> Vec<String> {
    STANDARD_MATCHERS.iter().map(|name| name.to_string()).collect()
}

fn enabled() -> bool {
    true
}

impl Default for Settings {
    /// A single file system repository under `repository/`.
    fn default() -> Self {
        Settings {
            default_resolver: None,
            latest_strategy: default_latest_strategy(),
            conflict_manager: default_conflict_manager(),
            statuses: default_statuses(),
            version_matchers: default_version_matchers(),
            check_modified: false,
            dynamic_ttl: 0,
            resolvers: vec![ResolverSettings::Filesystem {
                name: DEFAULT_RESOLVER_NAME.to_string(),
                root: PathBuf::from(DEFAULT_REPOSITORY_DIRECTORY),
                descriptor_patterns: vec![],
                artifact_patterns: vec![],
                transactional: Transactional::default(),
                check_consistency: true,
                descriptor_required: false,
            }],
            base_directory: PathBuf::new(),
        }
    }
}

/// Every configured resolver by name, with the one lookups start from.
#[derive(Debug, Clone)]
pub struct Resolvers {
    resolvers: BTreeMap<String, Arc<dyn DependencyResolver>>,
    default: String,
}

impl Resolvers {
    pub fn get(&self, name: &str) -> Option<&Arc<dyn DependencyResolver>> {
        self.resolvers.get(name)
    }

    pub fn default_resolver(&self) -> &Arc<dyn DependencyResolver> {
        &self.resolvers[&self.default]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::IO {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Settings::from_toml_str(&contents)?;
        settings.base_directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(settings)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(data)?;
        Ok(settings)
    }

    pub fn with_base_directory(mut self, base_directory: impl Into<PathBuf>) -> Self {
        self.base_directory = base_directory.into();
        self
    }

    pub fn status_manager(&self) -> StatusManager {
        StatusManager::new(self.statuses.iter())
    }

    pub fn dynamic_ttl(&self) -> Duration {
        Duration::from_secs(self.dynamic_ttl)
    }

    pub fn latest(&self) -> Result<Arc<dyn LatestStrategy>, SettingsError> {
        latest_strategy(&self.latest_strategy, &self.status_manager())
            .ok_or_else(|| SettingsError::UnknownLatestStrategy(self.latest_strategy.clone()))
    }

    pub fn resolve_data(&self) -> Result<ResolveData, SettingsError> {
        let statuses = self.status_manager();
        Ok(ResolveData {
            version_matcher: Arc::new(self.version_matcher_chain(&statuses)?),
            latest_strategy: self.latest()?,
            statuses,
            check_modified: self.check_modified,
            current: None,
        })
    }

    fn version_matcher_chain(&self, statuses: &StatusManager) -> Result<ChainVersionMatcher, SettingsError> {
        let matchers = self
            .version_matchers
            .iter()
            .map(|name| {
                version_matcher(name, statuses)
                    .ok_or_else(|| SettingsError::UnknownVersionMatcher(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChainVersionMatcher::new(matchers))
    }

    /// Instantiates every resolver, children before the composites that
    /// reference them.
    pub fn resolvers(
        &self,
        cache: Arc<dyn RepositoryCacheManager>,
    ) -> Result<Resolvers, SettingsError> {
        let mut declared: BTreeMap<&str, &ResolverSettings> = BTreeMap::new();
        for resolver in &self.resolvers {
            if declared.insert(resolver.name(), resolver).is_some() {
                return Err(SettingsError::DuplicateResolver(resolver.name().to_string()));
            }
        }
        let default = match &self.default_resolver {
            Some(name) => name.clone(),
            None => self
                .resolvers
                .first()
                .map(|r| r.name().to_string())
                .ok_or(SettingsError::NoResolver)?,
        };
        if !declared.contains_key(default.as_str()) {
            return Err(SettingsError::UnknownResolver(default));
        }

        let mut built = BTreeMap::new();
        for name in declared.keys() {
            self.build(name, &declared, &cache, &mut built, &mut BTreeSet::new())?;
        }
        debug!(
            "Configured resolvers: {}",
            built.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(Resolvers {
            resolvers: built,
            default,
        })
    }

    fn build(
        &self,
        name: &str,
        declared: &BTreeMap<&str, &ResolverSettings>,
        cache: &Arc<dyn RepositoryCacheManager>,
        built: &mut BTreeMap<String, Arc<dyn DependencyResolver>>,
        visiting: &mut BTreeSet<String>,
    ) -> Result<Arc<dyn DependencyResolver>, SettingsError> {
        if let Some(resolver) = built.get(name) {
            return Ok(resolver.clone());
        }
        let settings = declared
            .get(name)
            .ok_or_else(|| SettingsError::UnknownResolver(name.to_string()))?;
        if !visiting.insert(name.to_string()) {
            return Err(SettingsError::CircularResolver(name.to_string()));
        }
        let mut children = vec![];
        for reference in settings.references() {
            children.push(self.build(reference, declared, cache, built, visiting)?);
        }
        visiting.remove(name);

        let resolver: Arc<dyn DependencyResolver> = match settings {
            ResolverSettings::Filesystem {
                name,
                root,
                descriptor_patterns,
                artifact_patterns,
                transactional,
                check_consistency,
                descriptor_required,
            } => {
                let mut resolver =
                    FileSystemResolver::file_system(name, self.base_directory.join(root), cache.clone())
                        .with_transactional(*transactional)
                        .with_check_consistency(*check_consistency)
                        .with_descriptor_required(*descriptor_required);
                if !descriptor_patterns.is_empty() {
                    resolver = resolver.with_descriptor_patterns(descriptor_patterns.clone());
                }
                if !artifact_patterns.is_empty() {
                    resolver = resolver.with_artifact_patterns(artifact_patterns.clone());
                }
                Arc::new(resolver)
            }
            ResolverSettings::Chain {
                name,
                return_first,
                dual,
                latest_strategy: strategy,
                ..
            } => {
                let mut chain = ChainResolver::new(name, children)
                    .with_return_first(*return_first)
                    .with_dual(*dual);
                if let Some(strategy) = strategy {
                    chain = chain.with_latest_strategy(
                        latest_strategy(strategy, &self.status_manager())
                            .ok_or_else(|| SettingsError::UnknownLatestStrategy(strategy.clone()))?,
                    );
                }
                Arc::new(chain)
            }
            ResolverSettings::Dual {
                name,
                allow_missing_descriptor,
                ..
            } => {
                let mut children = children.into_iter();
                let mut dual =
                    DualResolver::new(name).with_allow_missing_descriptor(*allow_missing_descriptor);
                if let Some(metadata) = children.next() {
                    dual = dual.with_metadata_resolver(metadata);
                }
                if let Some(artifacts) = children.next() {
                    dual = dual.with_artifact_resolver(artifacts);
                }
                Arc::new(dual)
            }
        };
        built.insert(name.to_string(), resolver.clone());
        Ok(resolver)
    }

    /// Engine resolving through `resolver` with these policies.
    pub fn engine(&self, resolver: Arc<dyn DependencyResolver>) -> Result<ResolveEngine, SettingsError> {
        let data = self.resolve_data()?;
        let manager = conflict_manager(&self.conflict_manager, data.latest_strategy.clone())
            .ok_or_else(|| SettingsError::UnknownConflictManager(self.conflict_manager.clone()))?;
        Ok(ResolveEngine::new(resolver)
            .with_conflict_manager(manager)
            .with_resolve_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::cache::DefaultRepositoryCacheManager;

    const SETTINGS: &str = r#"
default_resolver = "main"
latest_strategy = "latest-time"
conflict_manager = "strict"
dynamic_ttl = 60

[[resolvers]]
kind = "chain"
name = "main"
resolvers = ["local", "split"]
return_first = true

[[resolvers]]
kind = "filesystem"
name = "local"
root = "repo"
transactional = "true"

[[resolvers]]
kind = "dual"
name = "split"
metadata = "local"
artifacts = "local"
"#;

    #[test]
    fn parse_settings() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        assert_eq!(settings.default_resolver.as_deref(), Some("main"));
        assert_eq!(settings.dynamic_ttl(), Duration::from_secs(60));
        assert_eq!(settings.statuses, vec!["release", "milestone", "integration"]);
        assert_eq!(
            settings.resolvers[1],
            ResolverSettings::Filesystem {
                name: "local".to_string(),
                root: PathBuf::from("repo"),
                descriptor_patterns: vec![],
                artifact_patterns: vec![],
                transactional: Transactional::True,
                check_consistency: true,
                descriptor_required: false,
            }
        );
    }

    #[test]
    fn build_resolver_graph() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(DefaultRepositoryCacheManager::new(dir.path().join("cache")).unwrap());
        let settings = Settings::from_toml_str(SETTINGS)
            .unwrap()
            .with_base_directory(dir.path());

        let resolvers = settings.resolvers(cache).unwrap();
        assert_eq!(resolvers.default_resolver().name(), "main");
        assert_eq!(resolvers.names().collect::<Vec<_>>(), vec!["local", "main", "split"]);

        let engine = settings.engine(resolvers.default_resolver().clone()).unwrap();
        assert_eq!(engine.conflict_manager().name(), "strict");
    }

    #[test]
    fn reject_bad_graphs() {
        let dir = tempdir().unwrap();
        let cache: Arc<dyn RepositoryCacheManager> =
            Arc::new(DefaultRepositoryCacheManager::new(dir.path().to_path_buf()).unwrap());

        let unknown = Settings::from_toml_str(
            r#"
[[resolvers]]
kind = "chain"
name = "main"
resolvers = ["missing"]
"#,
        )
        .unwrap();
        assert!(matches!(
            unknown.resolvers(cache.clone()),
            Err(SettingsError::UnknownResolver(name)) if name == "missing"
        ));

        let circular = Settings::from_toml_str(
            r#"
[[resolvers]]
kind = "chain"
name = "a"
resolvers = ["b"]

[[resolvers]]
kind = "chain"
name = "b"
resolvers = ["a"]
"#,
        )
        .unwrap();
        assert!(matches!(
            circular.resolvers(cache.clone()),
            Err(SettingsError::CircularResolver(_))
        ));

        let empty = Settings {
            resolvers: vec![],
            ..Settings::default()
        };
        assert!(matches!(empty.resolvers(cache), Err(SettingsError::NoResolver)));
    }

    #[test]
    fn restricted_version_matchers() {
        let settings = Settings::from_toml_str(r#"version_matchers = ["sub-revision"]"#).unwrap();
        let data = settings.resolve_data().unwrap();
        let asked = |revision: &str| crate::model::ModuleRevisionId::new("org", "a", revision);
        assert!(data.is_dynamic(&asked("1.0+")));
        assert!(!data.is_dynamic(&asked("latest.integration")));

        let unknown = Settings::from_toml_str(r#"version_matchers = ["newest"]"#).unwrap();
        assert!(matches!(
            unknown.resolve_data(),
            Err(SettingsError::UnknownVersionMatcher(name)) if name == "newest"
        ));
    }

    #[test]
    fn unknown_policies() {
        let settings = Settings {
            conflict_manager: "newest".to_string(),
            ..Settings::default()
        };
        let dir = tempdir().unwrap();
        let cache = Arc::new(DefaultRepositoryCacheManager::new(dir.path().to_path_buf()).unwrap());
        let resolvers = settings.resolvers(cache).unwrap();
        assert!(matches!(
            settings.engine(resolvers.default_resolver().clone()),
            Err(SettingsError::UnknownConflictManager(_))
        ));
    }
}
