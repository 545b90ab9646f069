use std::{path::Path, sync::Arc};

use log::debug;

use crate::model::{Artifact, DependencyDescriptor, ModuleId, ModuleRevisionId};

use super::{
    DependencyResolver, DownloadOptions, DownloadReport, ResolveData, ResolvedModuleRevision,
    ResolverError,
};

/// Metadata from one resolver, artifacts from another. A module is found
/// only if the artifact resolver has its artifacts too.
#[derive(Debug, Clone)]
pub struct DualResolver {
    name: String,
    metadata: Option<Arc<dyn DependencyResolver>>,
    artifacts: Option<Arc<dyn DependencyResolver>>,
    allow_missing_descriptor: bool,
}

impl DualResolver {
    pub fn new(name: impl Into<String>) -> Self {
        DualResolver {
            name: name.into(),
            metadata: None,
            artifacts: None,
            allow_missing_descriptor: false,
        }
    }

    pub fn with_metadata_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.metadata = Some(resolver);
        self
    }

    pub fn with_artifact_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.artifacts = Some(resolver);
        self
    }

    /// When the metadata resolver finds nothing, ask the artifact resolver.
    pub fn with_allow_missing_descriptor(mut self, allow: bool) -> Self {
        self.allow_missing_descriptor = allow;
        self
    }

    fn metadata(&self) -> Result<&Arc<dyn DependencyResolver>, ResolverError> {
        self.metadata.as_ref().ok_or_else(|| {
            ResolverError::Configuration(format!("dual resolver {} has no metadata resolver", self.name))
        })
    }

    fn artifacts(&self) -> Result<&Arc<dyn DependencyResolver>, ResolverError> {
        self.artifacts.as_ref().ok_or_else(|| {
            ResolverError::Configuration(format!("dual resolver {} has no artifact resolver", self.name))
        })
    }

    fn confirmed(
        &self,
        artifacts: &dyn DependencyResolver,
        found: &ResolvedModuleRevision,
    ) -> Result<bool, ResolverError> {
        let descriptor = &found.descriptor;
        for declared in &descriptor.artifacts {
            let artifact = Artifact::new(
                descriptor.module_revision_id.clone(),
                &declared.name,
                &declared.kind,
                &declared.ext,
            );
            if !artifacts.exists(&artifact)? {
                debug!(
                    "{} found {} but {} has no {artifact}",
                    found.resolver,
                    found.id(),
                    artifacts.name()
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl DependencyResolver for DualResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_dependency(
        &self,
        dd: &DependencyDescriptor,
        data: &ResolveData,
    ) -> Result<Option<ResolvedModuleRevision>, ResolverError> {
        let metadata = self.metadata()?;
        let artifacts = self.artifacts()?;

        match metadata.get_dependency(dd, data)? {
            Some(found) => {
                if !self.confirmed(artifacts.as_ref(), &found)? {
                    return Ok(None);
                }
                Ok(Some(found.with_artifact_resolver(artifacts.clone())))
            }
            None if self.allow_missing_descriptor => {
                debug!(
                    "No descriptor for {} in {}, asking {}",
                    dd.dependency,
                    metadata.name(),
                    artifacts.name()
                );
                artifacts.get_dependency(dd, data)
            }
            None => Ok(None),
        }
    }

    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        match self.artifacts() {
            Ok(resolver) => resolver.download(artifacts, options),
            Err(err) => {
                let mut report = DownloadReport::default();
                for artifact in artifacts {
                    report.add(super::ArtifactDownloadReport::failed(
                        artifact.clone(),
                        err.to_string(),
                    ));
                }
                report
            }
        }
    }

    fn exists(&self, artifact: &Artifact) -> Result<bool, ResolverError> {
        if artifact.is_metadata() {
            self.metadata()?.exists(artifact)
        } else {
            self.artifacts()?.exists(artifact)
        }
    }

    fn list_organisations(&self) -> Result<Vec<String>, ResolverError> {
        self.metadata()?.list_organisations()
    }

    fn list_modules(&self, organisation: &str) -> Result<Vec<String>, ResolverError> {
        self.metadata()?.list_modules(organisation)
    }

    fn list_revisions(&self, module: &ModuleId) -> Result<Vec<String>, ResolverError> {
        self.metadata()?.list_revisions(module)
    }

    fn begin_publish_transaction(
        &self,
        mrid: &ModuleRevisionId,
        overwrite: bool,
    ) -> Result<(), ResolverError> {
        self.metadata()?.begin_publish_transaction(mrid, overwrite)?;
        if let Err(err) = self.artifacts()?.begin_publish_transaction(mrid, overwrite) {
            self.metadata()?.abort_publish_transaction()?;
            return Err(err);
        }
        Ok(())
    }

    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<(), ResolverError> {
        if artifact.is_metadata() {
            self.metadata()?.publish(artifact, source, overwrite)
        } else {
            self.artifacts()?.publish(artifact, source, overwrite)
        }
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolverError> {
        self.artifacts()?.commit_publish_transaction()?;
        self.metadata()?.commit_publish_transaction()
    }

    fn abort_publish_transaction(&self) -> Result<(), ResolverError> {
        let artifacts = self.artifacts()?.abort_publish_transaction();
        let metadata = self.metadata()?.abort_publish_transaction();
        artifacts.and(metadata)
    }
}
