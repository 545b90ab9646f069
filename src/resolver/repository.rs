use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cache::{ArtifactOrigin, CachePolicy, CachedModule, RepositoryCacheManager},
    latest::{self, RevisionInfo},
    model::{
        file::{DescriptorParser, TomlDescriptorParser},
        Artifact, DependencyDescriptor, ModuleDescriptor, ModuleId, ModuleRevisionId,
    },
    repository::{FileRepository, Repository, Resource, TransportError},
};

use super::{
    pattern::{self, list_token_values, revision_directory, substitute},
    ArtifactDownloadReport, DependencyResolver, DownloadOptions, DownloadReport, ResolveData,
    ResolvedModuleRevision, ResolverError,
};

pub const DEFAULT_DESCRIPTOR_PATTERN: &str = "[organisation]/[module]/[revision]/module.toml";
pub const DEFAULT_ARTIFACT_PATTERN: &str =
    "[organisation]/[module]/[revision]/[artifact]-[revision].[ext]";

const STAGING_SUFFIX: &str = ".part";
const MAIN_ARTIFACT_TYPE: &str = "jar";

/// Whether publishing stages files until the transaction commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transactional {
    /// Stage when the layout allows it, publish in place otherwise.
    #[default]
    Auto,
    /// Always stage; layouts that cannot are rejected.
    True,
    False,
}

/// Resolver over any [`Repository`], locating descriptors and artifacts
/// through layout patterns.
#[derive(Debug)]
pub struct RepositoryResolver<R> {
    name: String,
    repository: Arc<R>,
    descriptor_patterns: Vec<String>,
    artifact_patterns: Vec<String>,
    parser: Arc<dyn DescriptorParser>,
    cache: Arc<dyn RepositoryCacheManager>,
    transactional: Transactional,
    check_consistency: bool,
    descriptor_required: bool,
    transaction: Arc<Mutex<Option<Transaction>>>,
}

pub type FileSystemResolver = RepositoryResolver<FileRepository>;

#[derive(Debug)]
struct Transaction {
    mrid: ModuleRevisionId,
    overwrite: bool,
    staging: Option<Staging>,
    published: Vec<Published>,
}

#[derive(Debug)]
struct Staging {
    destination: String,
    staging: String,
}

impl Staging {
    fn staged(&self, location: &str) -> Option<String> {
        location
            .strip_prefix(&self.destination)
            .map(|rest| format!("{}{rest}", self.staging))
    }

    fn unstaged(&self, location: &str) -> Option<String> {
        location
            .strip_prefix(&self.staging)
            .map(|rest| format!("{}{rest}", self.destination))
    }
}

#[derive(Debug)]
struct Published {
    location: String,
    created: bool,
}

impl<R> Clone for RepositoryResolver<R> {
    fn clone(&self) -> Self {
        RepositoryResolver {
            name: self.name.clone(),
            repository: self.repository.clone(),
            descriptor_patterns: self.descriptor_patterns.clone(),
            artifact_patterns: self.artifact_patterns.clone(),
            parser: self.parser.clone(),
            cache: self.cache.clone(),
            transactional: self.transactional,
            check_consistency: self.check_consistency,
            descriptor_required: self.descriptor_required,
            transaction: self.transaction.clone(),
        }
    }
}

impl FileSystemResolver {
    pub fn file_system(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        cache: Arc<dyn RepositoryCacheManager>,
    ) -> Self {
        RepositoryResolver::new(name, FileRepository::new(root), cache)
    }
}

impl<R: Repository + 'static> RepositoryResolver<R> {
    pub fn new(name: impl Into<String>, repository: R, cache: Arc<dyn RepositoryCacheManager>) -> Self {
        RepositoryResolver {
            name: name.into(),
            repository: Arc::new(repository),
            descriptor_patterns: vec![DEFAULT_DESCRIPTOR_PATTERN.to_string()],
            artifact_patterns: vec![DEFAULT_ARTIFACT_PATTERN.to_string()],
            parser: Arc::new(TomlDescriptorParser),
            cache,
            transactional: Transactional::default(),
            check_consistency: true,
            descriptor_required: false,
            transaction: Arc::default(),
        }
    }

    pub fn with_descriptor_patterns(mut self, patterns: Vec<String>) -> Self {
        self.descriptor_patterns = patterns;
        self
    }

    pub fn with_artifact_patterns(mut self, patterns: Vec<String>) -> Self {
        self.artifact_patterns = patterns;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn DescriptorParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_transactional(mut self, transactional: Transactional) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn with_check_consistency(mut self, check_consistency: bool) -> Self {
        self.check_consistency = check_consistency;
        self
    }

    /// Without a descriptor, a module is not found even if its main artifact is.
    pub fn with_descriptor_required(mut self, descriptor_required: bool) -> Self {
        self.descriptor_required = descriptor_required;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    fn transport(&self, source: TransportError) -> ResolverError {
        ResolverError::Transport {
            resolver: self.name.clone(),
            source,
        }
    }

    fn lock_transaction(&self) -> MutexGuard<'_, Option<Transaction>> {
        self.transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn patterns_for(&self, artifact: &Artifact) -> &[String] {
        if artifact.is_metadata() {
            &self.descriptor_patterns
        } else {
            &self.artifact_patterns
        }
    }

    fn find_resource(&self, artifact: &Artifact) -> Result<Option<(String, Resource)>, ResolverError> {
        let attributes = artifact.attributes();
        for pattern in self.patterns_for(artifact) {
            let location = substitute(pattern, &attributes);
            trace!("Looking for {artifact} at {location}");
            if let Some(resource) = self.repository.resource(&location).map_err(|e| self.transport(e))? {
                return Ok(Some((location, resource)));
            }
        }
        Ok(None)
    }

    fn main_artifact(mrid: &ModuleRevisionId) -> Artifact {
        Artifact::new(mrid.clone(), mrid.name(), MAIN_ARTIFACT_TYPE, MAIN_ARTIFACT_TYPE)
    }

    fn check_descriptor_consistency(
        &self,
        expected: &ModuleRevisionId,
        descriptor: &ModuleDescriptor,
    ) -> Result<(), ResolverError> {
        let found = &descriptor.module_revision_id;
        let consistent = found.module_id() == expected.module_id()
            && found.revision() == expected.revision()
            && (expected.branch().is_none() || found.branch() == expected.branch());
        if consistent {
            Ok(())
        } else {
            Err(ResolverError::Inconsistent {
                resolver: self.name.clone(),
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    /// Descriptor of a fixed revision, from the cache when the policy allows
    /// or when the repository copy is not newer.
    fn find_descriptor(
        &self,
        mrid: &ModuleRevisionId,
        policy: &CachePolicy,
    ) -> Result<Option<CachedModule>, ResolverError> {
        if let Some(cached) = self.cache.get_if_fresh(mrid, policy, Some(&self.name))? {
            debug!("Found {mrid} in the cache");
            return Ok(Some(cached));
        }
        let cached = self.cache.find_module(mrid, Some(&self.name))?;

        let metadata = Artifact::metadata(mrid.clone());
        if let Some((location, resource)) = self.find_resource(&metadata)? {
            if let Some(cached) = cached.filter(|c| resource.last_modified <= c.last_modified) {
                debug!("{mrid} is not modified in {}, using the cached descriptor", self.name);
                self.cache.touch_module(mrid)?;
                return Ok(Some(cached));
            }
            let content = self
                .repository
                .read(&location)
                .map_err(|e| self.transport(e))?;
            let mut descriptor =
                self.parser
                    .parse(mrid, &content)
                    .map_err(|source| ResolverError::Malformed {
                        resolver: self.name.clone(),
                        module: mrid.to_string(),
                        source,
                    })?;
            if self.check_consistency {
                self.check_descriptor_consistency(mrid, &descriptor)?;
            }
            if descriptor.publication == 0 {
                descriptor.publication = resource.last_modified;
            }
            return Ok(Some(self.cache.store_module(
                &self.name,
                descriptor,
                resource.last_modified,
            )?));
        }

        if self.descriptor_required {
            return Ok(None);
        }
        match self.find_resource(&Self::main_artifact(mrid))? {
            Some((location, resource)) => {
                if let Some(cached) =
                    cached.filter(|c| c.descriptor.default && resource.last_modified <= c.last_modified)
                {
                    return Ok(Some(cached));
                }
                debug!("No descriptor for {mrid} in {}, found {location}", self.name);
                let descriptor = ModuleDescriptor::synthesize_default(
                    mrid.clone(),
                    resource.last_modified,
                    MAIN_ARTIFACT_TYPE,
                    MAIN_ARTIFACT_TYPE,
                );
                Ok(Some(self.cache.store_module(
                    &self.name,
                    descriptor,
                    resource.last_modified,
                )?))
            }
            None => Ok(None),
        }
    }

    fn list_revision_candidates(
        &self,
        asked: &ModuleRevisionId,
    ) -> Result<Vec<RevisionInfo>, ResolverError> {
        let mut attributes = asked.attributes();
        attributes.remove(pattern::REVISION);
        let mut revisions = self.list_values(&self.descriptor_patterns, pattern::REVISION, &attributes)?;
        if revisions.is_empty() && !self.descriptor_required {
            let main = Self::main_artifact(asked);
            let mut attributes = main.attributes();
            attributes.remove(pattern::REVISION);
            revisions = self.list_values(&self.artifact_patterns, pattern::REVISION, &attributes)?;
        }

        let mut candidates = vec![];
        for revision in revisions {
            let mrid = asked.with_revision(&revision);
            let resource = match self.find_resource(&Artifact::metadata(mrid.clone()))? {
                Some((_, resource)) => Some(resource),
                None => self.find_resource(&Self::main_artifact(&mrid))?.map(|(_, r)| r),
            };
            let last_modified = resource.map_or(0, |r| r.last_modified);
            candidates.push(RevisionInfo::new(revision, last_modified));
        }
        Ok(candidates)
    }

    fn find_dynamic(
        &self,
        asked: &ModuleRevisionId,
        data: &ResolveData,
        policy: &CachePolicy,
    ) -> Result<Option<CachedModule>, ResolverError> {
        let matcher = &data.version_matcher;
        let mut candidates: Vec<RevisionInfo> = self
            .list_revision_candidates(asked)?
            .into_iter()
            .filter(|c| matcher.accept(asked, &asked.with_revision(&c.revision)))
            .collect();
        latest::sort(data.latest_strategy.as_ref(), &mut candidates);
        trace!(
            "Candidates for {asked} in {}: {:?}",
            self.name,
            candidates.iter().map(|c| &c.revision).collect::<Vec<_>>()
        );

        if data.latest_strategy.needs_descriptor() {
            let mut described = vec![];
            for candidate in &candidates {
                if let Some(found) = self.accepted_descriptor(asked, &candidate.revision, data, policy)? {
                    described.push(found);
                }
            }
            return Ok(latest::find_latest(data.latest_strategy.as_ref(), &described).cloned());
        }

        for candidate in candidates.iter().rev() {
            if let Some(found) = self.accepted_descriptor(asked, &candidate.revision, data, policy)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn accepted_descriptor(
        &self,
        asked: &ModuleRevisionId,
        revision: &str,
        data: &ResolveData,
        policy: &CachePolicy,
    ) -> Result<Option<CachedModule>, ResolverError> {
        let matcher = &data.version_matcher;
        let mrid = asked.with_revision(revision);
        let Some(found) = self.find_descriptor(&mrid, policy)? else {
            return Ok(None);
        };
        if matcher.needs_module_descriptor(asked, &mrid)
            && !matcher.accept_descriptor(asked, &found.descriptor)
        {
            debug!("{mrid} does not satisfy {asked}, status {}", found.descriptor.status);
            return Ok(None);
        }
        Ok(Some(found))
    }

    fn list_values(
        &self,
        patterns: &[String],
        token: &str,
        attributes: &BTreeMap<&str, &str>,
    ) -> Result<Vec<String>, ResolverError> {
        let mut values = vec![];
        for pattern in patterns {
            for value in list_token_values(self.repository.as_ref(), pattern, token, attributes)
                .map_err(|e| self.transport(e))?
            {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    fn list_all(&self, token: &str, attributes: &BTreeMap<&str, &str>) -> Result<Vec<String>, ResolverError> {
        let patterns: Vec<String> = self
            .descriptor_patterns
            .iter()
            .chain(&self.artifact_patterns)
            .cloned()
            .collect();
        let mut values = self.list_values(&patterns, token, attributes)?;
        values.sort();
        Ok(values)
    }

    /// The one directory every pattern puts a revision in, if there is one.
    fn shared_revision_directory(&self, mrid: &ModuleRevisionId) -> Option<String> {
        let metadata = Artifact::metadata(mrid.clone());
        let attributes = metadata.attributes();
        let mut directories = self
            .descriptor_patterns
            .iter()
            .chain(&self.artifact_patterns)
            .map(|p| revision_directory(p, &attributes));
        let first = directories.next()??;
        directories
            .all(|d| d.as_deref() == Some(first.as_str()))
            .then_some(first)
    }

    fn download_artifact(&self, artifact: &Artifact, options: &DownloadOptions) -> ArtifactDownloadReport {
        let (location, resource) = match self.find_resource(artifact) {
            Ok(Some(found)) => found,
            Ok(None) => {
                return ArtifactDownloadReport::failed(
                    artifact.clone(),
                    format!("{artifact} not found in {}", self.name),
                )
            }
            Err(err) => return ArtifactDownloadReport::failed(artifact.clone(), err.to_string()),
        };
        let origin = ArtifactOrigin {
            resolver: self.name.clone(),
            local_path: self.repository.local_path(&location),
            location,
            last_modified: resource.last_modified,
        };
        let fetch = |destination: &Path| self.repository.get(&origin.location, destination);
        self.cache.download(artifact, &origin, &fetch, options)
    }
}

impl<R: Repository + 'static> DependencyResolver for RepositoryResolver<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_dependency(
        &self,
        dd: &DependencyDescriptor,
        data: &ResolveData,
    ) -> Result<Option<ResolvedModuleRevision>, ResolverError> {
        if let Some(current) = data.already_resolved(dd) {
            debug!("{} already resolved by {}", current.id(), current.resolver);
            return Ok(Some(current.clone()));
        }
        let asked = &dd.dependency;
        let dynamic = data.is_dynamic(asked);
        let policy = CachePolicy {
            dynamic,
            check_modified: data.check_modified,
            changing: dd.changing,
        };

        let found = if dynamic {
            match self.cache.resolved_revision(&self.name, asked)? {
                Some(revision) => {
                    debug!("{asked} recently resolved to {revision} in {}", self.name);
                    let fixed = CachePolicy {
                        dynamic: false,
                        ..policy
                    };
                    self.find_descriptor(&asked.with_revision(revision), &fixed)?
                }
                None => {
                    let found = self.find_dynamic(asked, data, &policy)?;
                    if let Some(found) = &found {
                        self.cache.save_resolved_revision(
                            &self.name,
                            asked,
                            found.descriptor.module_revision_id.revision(),
                        )?;
                    }
                    found
                }
            }
        } else {
            self.find_descriptor(asked, &policy)?
        };

        Ok(found.map(|cached| {
            debug!(
                "Found {} for {asked} in {}",
                cached.descriptor.module_revision_id, self.name
            );
            ResolvedModuleRevision::new(cached.descriptor, self.name.clone(), Arc::new(self.clone()))
                .with_force(dd.force)
        }))
    }

    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let mut report = DownloadReport::default();
        for artifact in artifacts {
            report.add(self.download_artifact(artifact, options));
        }
        report
    }

    fn exists(&self, artifact: &Artifact) -> Result<bool, ResolverError> {
        Ok(self.find_resource(artifact)?.is_some())
    }

    fn list_organisations(&self) -> Result<Vec<String>, ResolverError> {
        self.list_all(pattern::ORGANISATION, &BTreeMap::new())
    }

    fn list_modules(&self, organisation: &str) -> Result<Vec<String>, ResolverError> {
        self.list_all(
            pattern::MODULE,
            &BTreeMap::from([(pattern::ORGANISATION, organisation)]),
        )
    }

    fn list_revisions(&self, module: &ModuleId) -> Result<Vec<String>, ResolverError> {
        self.list_all(
            pattern::REVISION,
            &BTreeMap::from([
                (pattern::ORGANISATION, module.organisation()),
                (pattern::MODULE, module.name()),
            ]),
        )
    }

    fn begin_publish_transaction(
        &self,
        mrid: &ModuleRevisionId,
        overwrite: bool,
    ) -> Result<(), ResolverError> {
        let mut transaction = self.lock_transaction();
        if let Some(current) = transaction.as_ref() {
            return Err(ResolverError::publish(
                &self.name,
                format!("a transaction publishing {} is in progress", current.mrid),
            ));
        }

        let staging = match self.transactional {
            Transactional::False => None,
            mode => match self.shared_revision_directory(mrid) {
                Some(destination) if self.repository.supports_rename() => {
                    let existing = self
                        .repository
                        .list(&destination)
                        .map_err(|e| self.transport(e))?;
                    if !overwrite && !existing.is_empty() {
                        return Err(ResolverError::publish(
                            &self.name,
                            format!("{mrid} is already published"),
                        ));
                    }
                    let staging = format!("{destination}{STAGING_SUFFIX}");
                    if !self
                        .repository
                        .list(&staging)
                        .map_err(|e| self.transport(e))?
                        .is_empty()
                    {
                        warn!("Removing leftover staging directory {staging}");
                        self.repository
                            .delete(&staging)
                            .map_err(|e| self.transport(e))?;
                    }
                    Some(Staging {
                        destination,
                        staging,
                    })
                }
                _ if mode == Transactional::True => {
                    return Err(ResolverError::publish(
                        &self.name,
                        "transactional publish needs every pattern to share one revision directory in a repository supporting rename",
                    ));
                }
                _ => {
                    debug!("Publishing {mrid} to {} without staging", self.name);
                    None
                }
            },
        };

        info!("Starting to publish {mrid} to {}", self.name);
        *transaction = Some(Transaction {
            mrid: mrid.clone(),
            overwrite,
            staging,
            published: vec![],
        });
        Ok(())
    }

    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<(), ResolverError> {
        let mut guard = self.lock_transaction();
        let transaction = guard.as_mut().ok_or_else(|| {
            ResolverError::publish(&self.name, format!("no transaction to publish {artifact} in"))
        })?;
        if artifact.module_revision_id != transaction.mrid {
            return Err(ResolverError::publish(
                &self.name,
                format!("{artifact} does not belong to {}", transaction.mrid),
            ));
        }
        let pattern = self.patterns_for(artifact).first().ok_or_else(|| {
            ResolverError::Configuration(format!("{} has no pattern for {artifact}", self.name))
        })?;
        let destination = substitute(pattern, &artifact.attributes());
        let overwrite = overwrite || transaction.overwrite;

        let published = match &transaction.staging {
            Some(staging) => {
                let staged = staging.staged(&destination).ok_or_else(|| {
                    ResolverError::publish(
                        &self.name,
                        format!("{destination} is outside {}", staging.destination),
                    )
                })?;
                self.repository
                    .put(source, &staged, true)
                    .map_err(|e| self.transport(e))?;
                Published {
                    location: staged,
                    created: true,
                }
            }
            None => {
                let existed = self
                    .repository
                    .resource(&destination)
                    .map_err(|e| self.transport(e))?
                    .is_some();
                if existed && !overwrite {
                    return Err(ResolverError::publish(
                        &self.name,
                        format!("{destination} already exists"),
                    ));
                }
                self.repository
                    .put(source, &destination, overwrite)
                    .map_err(|e| self.transport(e))?;
                Published {
                    location: destination,
                    created: !existed,
                }
            }
        };
        debug!("Published {artifact} to {}", published.location);
        transaction.published.push(published);
        Ok(())
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolverError> {
        let transaction = self.lock_transaction().take().ok_or_else(|| {
            ResolverError::publish(&self.name, "no publish transaction to commit")
        })?;
        if let Some(staging) = &transaction.staging {
            if transaction.overwrite {
                self.repository
                    .delete(&staging.destination)
                    .map_err(|e| self.transport(e))?;
            }
            for published in &transaction.published {
                let Some(destination) = staging.unstaged(&published.location) else {
                    continue;
                };
                self.repository
                    .rename(&published.location, &destination)
                    .map_err(|e| self.transport(e))?;
            }
            self.repository
                .delete(&staging.staging)
                .map_err(|e| self.transport(e))?;
        }
        info!("Published {} to {}", transaction.mrid, self.name);
        Ok(())
    }

    fn abort_publish_transaction(&self) -> Result<(), ResolverError> {
        let Some(transaction) = self.lock_transaction().take() else {
            return Ok(());
        };
        match &transaction.staging {
            Some(staging) => self
                .repository
                .delete(&staging.staging)
                .map_err(|e| self.transport(e))?,
            None => {
                for published in &transaction.published {
                    if published.created {
                        self.repository
                            .delete(&published.location)
                            .map_err(|e| self.transport(e))?;
                    } else {
                        warn!("{} was overwritten and cannot be restored", published.location);
                    }
                }
            }
        }
        info!("Aborted publishing {} to {}", transaction.mrid, self.name);
        Ok(())
    }
}
