//! The capability every repository backend offers: look a module up, download
//! its artifacts, list what is available, publish.
//!
//! A lookup distinguishes three outcomes: `Ok(Some(_))` found,
//! `Ok(None)` not found (try elsewhere), `Err(_)` a failure that composite
//! resolvers never swallow.

mod chain;
mod download;
mod dual;
mod pattern;
mod repository;

use std::{fmt::Debug, path::Path, sync::Arc};

use log::warn;
use thiserror::Error;

use crate::{
    cache::CacheError,
    latest::{ArtifactInfo, LatestRevisionStrategy, LatestStrategy},
    model::{
        Artifact, DependencyDescriptor, ModuleDescriptor, ModuleId, ModuleRevisionId, ParseError,
        StatusManager,
    },
    repository::TransportError,
    version::{ChainVersionMatcher, VersionMatcher},
};

pub use chain::ChainResolver;
pub use download::{ArtifactDownloadReport, DownloadOptions, DownloadReport, DownloadStatus};
pub use dual::DualResolver;
pub use pattern::substitute;
pub use repository::{FileSystemResolver, RepositoryResolver, Transactional};

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Malformed descriptor for {module} in {resolver}: {source}")]
    Malformed {
        resolver: String,
        module: String,
        source: ParseError,
    },
    #[error("Inconsistent descriptor in {resolver}: expected {expected}, found {found}")]
    Inconsistent {
        resolver: String,
        expected: String,
        found: String,
    },
    #[error("Transport error in {resolver}: {source}")]
    Transport {
        resolver: String,
        source: TransportError,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Publish error in {resolver}: {message}")]
    Publish { resolver: String, message: String },
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ResolverError {
    /// Transport failures affect one dependency; anything else aborts the
    /// resolution.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ResolverError::Transport { .. })
    }

    pub(crate) fn publish(resolver: &str, message: impl Into<String>) -> Self {
        ResolverError::Publish {
            resolver: resolver.to_string(),
            message: message.into(),
        }
    }
}

/// Everything a resolver needs from the ongoing resolution.
#[derive(Debug, Clone)]
pub struct ResolveData {
    pub version_matcher: Arc<dyn VersionMatcher>,
    pub latest_strategy: Arc<dyn LatestStrategy>,
    pub statuses: StatusManager,
    pub check_modified: bool,
    /// What an earlier resolver already found for the same request.
    pub current: Option<ResolvedModuleRevision>,
}

impl Default for ResolveData {
    fn default() -> Self {
        ResolveData {
            version_matcher: Arc::new(ChainVersionMatcher::default()),
            latest_strategy: Arc::new(LatestRevisionStrategy::default()),
            statuses: StatusManager::default(),
            check_modified: false,
            current: None,
        }
    }
}

impl ResolveData {
    pub fn with_current(&self, current: Option<ResolvedModuleRevision>) -> Self {
        ResolveData {
            current,
            ..self.clone()
        }
    }

    pub fn with_latest_strategy(&self, latest_strategy: Arc<dyn LatestStrategy>) -> Self {
        ResolveData {
            latest_strategy,
            ..self.clone()
        }
    }

    pub fn is_dynamic(&self, mrid: &ModuleRevisionId) -> bool {
        self.version_matcher.is_dynamic(mrid)
    }

    /// The current result when it settles the request without asking any
    /// repository: it is forced, or it is real metadata for a fixed revision.
    pub fn already_resolved(&self, dd: &DependencyDescriptor) -> Option<&ResolvedModuleRevision> {
        self.current.as_ref().filter(|current| {
            current.force || (!current.is_default() && !self.is_dynamic(&dd.dependency))
        })
    }
}

/// A module descriptor together with who found it and who serves its
/// artifacts.
#[derive(Debug, Clone)]
pub struct ResolvedModuleRevision {
    pub descriptor: Arc<ModuleDescriptor>,
    /// Name of the resolver that found the descriptor.
    pub resolver: String,
    pub artifact_resolver: Arc<dyn DependencyResolver>,
    pub force: bool,
}

impl ResolvedModuleRevision {
    pub fn new(
        descriptor: Arc<ModuleDescriptor>,
        resolver: impl Into<String>,
        artifact_resolver: Arc<dyn DependencyResolver>,
    ) -> Self {
        ResolvedModuleRevision {
            descriptor,
            resolver: resolver.into(),
            artifact_resolver,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_artifact_resolver(mut self, artifact_resolver: Arc<dyn DependencyResolver>) -> Self {
        self.artifact_resolver = artifact_resolver;
        self
    }

    pub fn id(&self) -> &ModuleRevisionId {
        &self.descriptor.module_revision_id
    }

    pub fn is_default(&self) -> bool {
        self.descriptor.default
    }
}

impl ArtifactInfo for ResolvedModuleRevision {
    fn revision(&self) -> &str {
        self.id().revision()
    }

    fn last_modified(&self) -> u64 {
        self.descriptor.publication
    }

    fn status(&self) -> Option<&str> {
        Some(&self.descriptor.status)
    }
}

pub trait DependencyResolver: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn get_dependency(
        &self,
        dd: &DependencyDescriptor,
        data: &ResolveData,
    ) -> Result<Option<ResolvedModuleRevision>, ResolverError>;

    /// One report entry per artifact; individual failures never make the
    /// whole call fail.
    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport;

    fn exists(&self, artifact: &Artifact) -> Result<bool, ResolverError>;

    fn list_organisations(&self) -> Result<Vec<String>, ResolverError> {
        Ok(vec![])
    }

    fn list_modules(&self, _organisation: &str) -> Result<Vec<String>, ResolverError> {
        Ok(vec![])
    }

    fn list_revisions(&self, _module: &ModuleId) -> Result<Vec<String>, ResolverError> {
        Ok(vec![])
    }

    /// Starts publishing a module revision. Nothing published afterwards is
    /// visible before [`DependencyResolver::commit_publish_transaction`].
    fn begin_publish_transaction(
        &self,
        mrid: &ModuleRevisionId,
        _overwrite: bool,
    ) -> Result<(), ResolverError> {
        Err(ResolverError::publish(
            self.name(),
            format!("publishing {mrid} is not supported"),
        ))
    }

    fn publish(&self, artifact: &Artifact, _source: &Path, _overwrite: bool) -> Result<(), ResolverError> {
        Err(ResolverError::publish(
            self.name(),
            format!("publishing {artifact} is not supported"),
        ))
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolverError> {
        Ok(())
    }

    /// Leaves the repository as it was before the transaction began.
    fn abort_publish_transaction(&self) -> Result<(), ResolverError> {
        Ok(())
    }
}

/// A publish transaction aborted on drop unless committed.
pub struct PublishTransaction<'a> {
    resolver: &'a dyn DependencyResolver,
    finished: bool,
}

impl<'a> PublishTransaction<'a> {
    pub fn begin(
        resolver: &'a dyn DependencyResolver,
        mrid: &ModuleRevisionId,
        overwrite: bool,
    ) -> Result<Self, ResolverError> {
        resolver.begin_publish_transaction(mrid, overwrite)?;
        Ok(PublishTransaction {
            resolver,
            finished: false,
        })
    }

    pub fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<(), ResolverError> {
        self.resolver.publish(artifact, source, overwrite)
    }

    pub fn commit(mut self) -> Result<(), ResolverError> {
        self.finished = true;
        self.resolver.commit_publish_transaction()
    }

    pub fn abort(mut self) -> Result<(), ResolverError> {
        self.finished = true;
        self.resolver.abort_publish_transaction()
    }
}

impl Drop for PublishTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.resolver.abort_publish_transaction() {
                warn!(
                    "Failed to abort publish transaction in {}: {err}",
                    self.resolver.name()
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Resolvers serving canned descriptors and recording what they are asked.

    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct MockResolver {
        name: String,
        modules: Vec<ModuleDescriptor>,
        fail: bool,
        pub asked: Arc<Mutex<Vec<ModuleRevisionId>>>,
        pub downloaded: Arc<Mutex<Vec<Artifact>>>,
    }

    impl MockResolver {
        pub fn new(name: &str) -> Self {
            MockResolver {
                name: name.to_string(),
                modules: vec![],
                fail: false,
                asked: Arc::default(),
                downloaded: Arc::default(),
            }
        }

        pub fn with_module(mut self, descriptor: ModuleDescriptor) -> Self {
            self.modules.push(descriptor);
            self
        }

        /// Every lookup fails with malformed metadata.
        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub fn asked(&self) -> Vec<ModuleRevisionId> {
            self.asked.lock().unwrap().clone()
        }

        pub fn downloaded(&self) -> Vec<Artifact> {
            self.downloaded.lock().unwrap().clone()
        }
    }

    pub fn descriptor(org: &str, name: &str, rev: &str, publication: u64) -> ModuleDescriptor {
        let mut descriptor = ModuleDescriptor::new(ModuleRevisionId::new(org, name, rev));
        descriptor.publication = publication;
        descriptor
    }

    pub fn default_descriptor(org: &str, name: &str, rev: &str, publication: u64) -> ModuleDescriptor {
        ModuleDescriptor::synthesize_default(
            ModuleRevisionId::new(org, name, rev),
            publication,
            "jar",
            "jar",
        )
    }

    impl DependencyResolver for MockResolver {
        fn name(&self) -> &str {
            &self.name
        }

        fn get_dependency(
            &self,
            dd: &DependencyDescriptor,
            data: &ResolveData,
        ) -> Result<Option<ResolvedModuleRevision>, ResolverError> {
            self.asked.lock().unwrap().push(dd.dependency.clone());
            if self.fail {
                return Err(ResolverError::Malformed {
                    resolver: self.name.clone(),
                    module: dd.dependency.to_string(),
                    source: ParseError::MissingKey("info".to_string()),
                });
            }
            let asked = &dd.dependency;
            let candidates: Vec<&ModuleDescriptor> = self
                .modules
                .iter()
                .filter(|md| md.module_id() == asked.module_id())
                .filter(|md| {
                    let found = &md.module_revision_id;
                    if data.version_matcher.needs_module_descriptor(asked, found) {
                        data.version_matcher.accept_descriptor(asked, md)
                    } else {
                        data.version_matcher.accept(asked, found)
                    }
                })
                .collect();
            let best = candidates.into_iter().reduce(|best, md| {
                let a = ResolvedModuleRevision::new(Arc::new(md.clone()), "", Arc::new(self.clone()));
                let b = ResolvedModuleRevision::new(Arc::new(best.clone()), "", Arc::new(self.clone()));
                if data.latest_strategy.compare(&a, &b).is_lt() {
                    best
                } else {
                    md
                }
            });
            Ok(best.map(|md| {
                ResolvedModuleRevision::new(Arc::new(md.clone()), self.name.clone(), Arc::new(self.clone()))
                    .with_force(dd.force)
            }))
        }

        fn download(&self, artifacts: &[Artifact], _options: &DownloadOptions) -> DownloadReport {
            let mut report = DownloadReport::default();
            for artifact in artifacts {
                let known = self
                    .modules
                    .iter()
                    .any(|md| md.module_revision_id == artifact.module_revision_id);
                if known {
                    self.downloaded.lock().unwrap().push(artifact.clone());
                    report.add(ArtifactDownloadReport::new(
                        artifact.clone(),
                        DownloadStatus::Successful,
                    ));
                } else {
                    report.add(ArtifactDownloadReport::failed(artifact.clone(), "unknown"));
                }
            }
            report
        }

        fn exists(&self, artifact: &Artifact) -> Result<bool, ResolverError> {
            Ok(self
                .modules
                .iter()
                .any(|md| md.module_revision_id == artifact.module_revision_id))
        }

        fn list_organisations(&self) -> Result<Vec<String>, ResolverError> {
            let mut organisations: Vec<String> = self
                .modules
                .iter()
                .map(|md| md.module_revision_id.organisation().to_string())
                .collect();
            organisations.sort();
            organisations.dedup();
            Ok(organisations)
        }
    }
}
