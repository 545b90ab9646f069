use std::{cmp::Ordering, path::Path, sync::Arc};

use log::{debug, trace};

use crate::{
    latest::LatestStrategy,
    model::{Artifact, DependencyDescriptor, ModuleId, ModuleRevisionId},
};

use super::{
    DependencyResolver, DownloadOptions, DownloadReport, DownloadStatus, ResolveData,
    ResolvedModuleRevision, ResolverError,
};

/// Asks its children in order.
///
/// A fixed revision is settled by the first child returning real metadata,
/// or by the first child returning anything when `return_first` is set.
/// Otherwise every child is asked and the most recent result wins, a
/// synthesized descriptor only when nothing else was found. Errors from a
/// child are returned as is: only "not found" moves on to the next child.
#[derive(Debug, Clone)]
pub struct ChainResolver {
    name: String,
    resolvers: Arc<Vec<Arc<dyn DependencyResolver>>>,
    return_first: bool,
    dual: bool,
    latest_strategy: Option<Arc<dyn LatestStrategy>>,
}

impl ChainResolver {
    pub fn new(name: impl Into<String>, resolvers: Vec<Arc<dyn DependencyResolver>>) -> Self {
        ChainResolver {
            name: name.into(),
            resolvers: Arc::new(resolvers),
            return_first: false,
            dual: false,
            latest_strategy: None,
        }
    }

    pub fn with_return_first(mut self, return_first: bool) -> Self {
        self.return_first = return_first;
        self
    }

    /// Keep the chain itself as the artifact resolver of what it finds.
    pub fn with_dual(mut self, dual: bool) -> Self {
        self.dual = dual;
        self
    }

    /// Strategy used by this chain instead of the one of the resolution.
    pub fn with_latest_strategy(mut self, latest_strategy: Arc<dyn LatestStrategy>) -> Self {
        self.latest_strategy = Some(latest_strategy);
        self
    }

    pub fn resolvers(&self) -> &[Arc<dyn DependencyResolver>] {
        &self.resolvers
    }

    /// `found` replaces `best` unless it is synthesized and `best` is not,
    /// or it is strictly older. Ties go to `found`.
    fn keep_latest(
        strategy: &dyn LatestStrategy,
        best: ResolvedModuleRevision,
        found: ResolvedModuleRevision,
    ) -> ResolvedModuleRevision {
        match (best.is_default(), found.is_default()) {
            (false, true) => {
                debug!("Ignoring default {}, already have {}", found.id(), best.id());
                best
            }
            (true, false) => found,
            _ => {
                if strategy.compare(&found, &best) == Ordering::Less {
                    debug!("Ignoring {}, {} is more recent", found.id(), best.id());
                    best
                } else {
                    found
                }
            }
        }
    }

    fn finish(&self, resolved: ResolvedModuleRevision) -> ResolvedModuleRevision {
        if self.dual {
            resolved.with_artifact_resolver(Arc::new(self.clone()))
        } else {
            resolved
        }
    }
}

impl DependencyResolver for ChainResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_dependency(
        &self,
        dd: &DependencyDescriptor,
        data: &ResolveData,
    ) -> Result<Option<ResolvedModuleRevision>, ResolverError> {
        let data = match &self.latest_strategy {
            Some(strategy) => data.with_latest_strategy(strategy.clone()),
            None => data.clone(),
        };
        let mut best = data.current.clone();

        for resolver in self.resolvers.iter() {
            let context = data.with_current(best.clone());
            if let Some(settled) = context.already_resolved(dd) {
                debug!(
                    "{} settled by {} in {}, not asking {}",
                    dd.dependency,
                    settled.resolver,
                    self.name,
                    resolver.name()
                );
                return Ok(Some(self.finish(settled.clone())));
            }

            trace!("Asking {} for {}", resolver.name(), dd.dependency);
            let Some(found) = resolver.get_dependency(dd, &context)? else {
                continue;
            };
            if self.return_first {
                debug!(
                    "{} found {} in {}, returning first",
                    self.name,
                    found.id(),
                    resolver.name()
                );
                return Ok(Some(self.finish(found)));
            }
            best = Some(match best {
                Some(best) => Self::keep_latest(data.latest_strategy.as_ref(), best, found),
                None => found,
            });
        }

        Ok(best.map(|resolved| self.finish(resolved)))
    }

    /// Each child downloads what the previous ones could not.
    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let mut report = DownloadReport::default();
        let mut pending: Vec<Artifact> = artifacts.to_vec();
        let mut failures = vec![];
        for resolver in self.resolvers.iter() {
            if pending.is_empty() {
                break;
            }
            failures.clear();
            for artifact_report in resolver.download(&pending, options).artifacts {
                if artifact_report.status == DownloadStatus::Failed {
                    failures.push(artifact_report);
                } else {
                    report.add(artifact_report);
                }
            }
            pending = failures.iter().map(|r| r.artifact.clone()).collect();
        }
        for failure in failures {
            report.add(failure);
        }
        report
    }

    fn exists(&self, artifact: &Artifact) -> Result<bool, ResolverError> {
        for resolver in self.resolvers.iter() {
            if resolver.exists(artifact)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn list_organisations(&self) -> Result<Vec<String>, ResolverError> {
        merge(self.resolvers.iter().map(|r| r.list_organisations()))
    }

    fn list_modules(&self, organisation: &str) -> Result<Vec<String>, ResolverError> {
        merge(self.resolvers.iter().map(|r| r.list_modules(organisation)))
    }

    fn list_revisions(&self, module: &ModuleId) -> Result<Vec<String>, ResolverError> {
        merge(self.resolvers.iter().map(|r| r.list_revisions(module)))
    }

    fn begin_publish_transaction(
        &self,
        mrid: &ModuleRevisionId,
        overwrite: bool,
    ) -> Result<(), ResolverError> {
        self.first()?.begin_publish_transaction(mrid, overwrite)
    }

    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<(), ResolverError> {
        self.first()?.publish(artifact, source, overwrite)
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolverError> {
        self.first()?.commit_publish_transaction()
    }

    fn abort_publish_transaction(&self) -> Result<(), ResolverError> {
        self.first()?.abort_publish_transaction()
    }
}

impl ChainResolver {
    /// Publishing goes to the first child.
    fn first(&self) -> Result<&Arc<dyn DependencyResolver>, ResolverError> {
        self.resolvers.first().ok_or_else(|| {
            ResolverError::Configuration(format!("chain {} has no resolver", self.name))
        })
    }
}

fn merge(
    lists: impl Iterator<Item = Result<Vec<String>, ResolverError>>,
) -> Result<Vec<String>, ResolverError> {
    let mut merged = vec![];
    for list in lists {
        merged.extend(list?);
    }
    merged.sort();
    merged.dedup();
    Ok(merged)
}
