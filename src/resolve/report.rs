use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    time::Duration,
};

use crate::{
    model::{descriptor::DEFAULT_CONFIGURATION, ModuleId, ModuleRevisionId},
    resolver::{ArtifactDownloadReport, DownloadStatus},
};

/// How a resolution is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Root configurations to resolve; `*` selects every public one.
    pub confs: Vec<String>,
    pub check_modified: bool,
    pub use_origin: bool,
    /// When false only direct dependencies are resolved.
    pub transitive: bool,
    /// Stop at the first unresolved dependency or failed download.
    pub halt_on_failure: bool,
    /// Fetch artifacts once the graph is settled.
    pub download: bool,
    /// Groups successive resolutions of the same root, to tell whether its
    /// dependencies changed. Defaults to the root module id.
    pub resolve_id: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            confs: vec![DEFAULT_CONFIGURATION.to_string()],
            check_modified: false,
            use_origin: false,
            transitive: true,
            halt_on_failure: true,
            download: true,
            resolve_id: None,
        }
    }
}

impl ResolveOptions {
    pub fn with_confs<I, S>(mut self, confs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.confs = confs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_halt_on_failure(mut self, halt_on_failure: bool) -> Self {
        self.halt_on_failure = halt_on_failure;
        self
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    pub fn with_transitive(mut self, transitive: bool) -> Self {
        self.transitive = transitive;
        self
    }

    pub fn with_check_modified(mut self, check_modified: bool) -> Self {
        self.check_modified = check_modified;
        self
    }

    pub fn with_use_origin(mut self, use_origin: bool) -> Self {
        self.use_origin = use_origin;
        self
    }

    pub fn with_resolve_id(mut self, resolve_id: impl Into<String>) -> Self {
        self.resolve_id = Some(resolve_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Resolved,
    Evicted,
    Failed,
}

/// A module revision kept in the graph of one root configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub id: ModuleRevisionId,
    /// Revisions asked for by the edges leading here, dynamic ones included.
    pub requested: BTreeSet<ModuleRevisionId>,
    pub callers: BTreeSet<ModuleRevisionId>,
    /// Configurations of this module the graph needs.
    pub configurations: BTreeSet<String>,
    pub resolver: String,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionRecord {
    pub evicted: ModuleRevisionId,
    pub winner: Option<ModuleRevisionId>,
    pub conflict_manager: String,
    /// Module whose dependency introduced the evicted revision.
    pub parent: ModuleRevisionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFailure {
    pub requested: ModuleRevisionId,
    pub parent: ModuleRevisionId,
    pub reason: String,
}

impl Display for DependencyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (required by {}): {}",
            self.requested, self.parent, self.reason
        )
    }
}

/// A cycle of modules, the first one repeated at the end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CircularDependency {
    pub path: Vec<ModuleId>,
}

impl Display for CircularDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        f.write_str(&path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationResolveReport {
    pub configuration: String,
    pub modules: Vec<ResolvedModule>,
    pub evicted: Vec<EvictionRecord>,
    pub failures: Vec<DependencyFailure>,
    pub circular: Vec<CircularDependency>,
    pub artifacts: Vec<ArtifactDownloadReport>,
}

impl ConfigurationResolveReport {
    pub fn new(configuration: impl Into<String>) -> Self {
        ConfigurationResolveReport {
            configuration: configuration.into(),
            modules: vec![],
            evicted: vec![],
            failures: vec![],
            circular: vec![],
            artifacts: vec![],
        }
    }

    pub fn module_ids(&self) -> Vec<&ModuleRevisionId> {
        self.modules.iter().map(|m| &m.id).collect()
    }

    pub fn module(&self, module_id: &ModuleId) -> Option<&ResolvedModule> {
        self.modules.iter().find(|m| m.id.module_id() == module_id)
    }

    pub fn eviction(&self, mrid: &ModuleRevisionId) -> Option<&EvictionRecord> {
        self.evicted.iter().find(|e| &e.evicted == mrid)
    }

    pub fn state(&self, mrid: &ModuleRevisionId) -> Option<ModuleState> {
        if self.modules.iter().any(|m| &m.id == mrid) {
            Some(ModuleState::Resolved)
        } else if self.eviction(mrid).is_some() {
            Some(ModuleState::Evicted)
        } else if self.failures.iter().any(|f| &f.requested == mrid) {
            Some(ModuleState::Failed)
        } else {
            None
        }
    }

    pub fn download_count(&self, status: DownloadStatus) -> usize {
        self.artifacts.iter().filter(|a| a.status == status).count()
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty() || self.download_count(DownloadStatus::Failed) > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    pub root: ModuleRevisionId,
    pub resolve_id: String,
    pub configurations: BTreeMap<String, ConfigurationResolveReport>,
    /// The dependency graph differs from the previous resolution with the
    /// same resolve id. Always true the first time.
    pub dependencies_changed: bool,
    pub elapsed: Duration,
}

impl ResolveReport {
    pub fn configuration(&self, conf: &str) -> Option<&ConfigurationResolveReport> {
        self.configurations.get(conf)
    }

    pub fn has_errors(&self) -> bool {
        self.configurations.values().any(|c| c.has_errors())
    }

    pub fn failures(&self) -> impl Iterator<Item = &DependencyFailure> {
        self.configurations.values().flat_map(|c| c.failures.iter())
    }

    /// Every artifact report, once per artifact even when several
    /// configurations need it.
    pub fn artifacts(&self) -> Vec<&ArtifactDownloadReport> {
        let mut seen = BTreeSet::new();
        self.configurations
            .values()
            .flat_map(|c| c.artifacts.iter())
            .filter(|a| seen.insert(a.artifact.to_string()))
            .collect()
    }
}
