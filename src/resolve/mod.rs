//! Turns a root module and its configurations into a conflict-free graph of
//! module revisions, then fetches their artifacts.
//!
//! Each root configuration is walked depth first. After a walk, every module
//! reached in several revisions goes through the conflict manager; losers are
//! evicted and the walk starts over, redirecting any edge that lands on an
//! evicted revision to its winner. The set of evicted revisions only grows,
//! so the loop ends once a walk evicts nothing new.

mod conflict;
mod report;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use dashmap::DashMap;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    model::{
        descriptor::{ANY_CONFIGURATION, DEFAULT_CONFIGURATION},
        Artifact, ArtifactRule, DependencyDescriptor, ModuleDescriptor, ModuleId,
        ModuleRevisionId, ParseError,
    },
    resolver::{
        ArtifactDownloadReport, DependencyResolver, DownloadOptions, DownloadStatus, ResolveData,
        ResolvedModuleRevision, ResolverError,
    },
};

pub use conflict::{
    conflict_manager, AllConflictManager, ConflictCandidate, ConflictError, ConflictManager,
    LatestConflictManager, StrictConflictManager,
};
pub use report::{
    CircularDependency, ConfigurationResolveReport, DependencyFailure, EvictionRecord,
    ModuleState, ResolveOptions, ResolveReport, ResolvedModule,
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Configuration `{conf}` does not exist in {module}")]
    UnknownConfiguration { conf: String, module: String },
    #[error("Unresolved dependency {0}")]
    Unresolved(DependencyFailure),
    #[error("Failed to download {artifact}: {reason}")]
    Download { artifact: String, reason: String },
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("Error while reading descriptor: {0}")]
    Descriptor(#[from] ParseError),
}

#[derive(Debug)]
pub struct ResolveEngine {
    resolver: Arc<dyn DependencyResolver>,
    conflict_manager: Arc<dyn ConflictManager>,
    data: ResolveData,
    /// Edges of the last graph resolved under each resolve id.
    previous: DashMap<String, BTreeSet<(ModuleRevisionId, ModuleRevisionId)>>,
}

impl ResolveEngine {
    pub fn new(resolver: Arc<dyn DependencyResolver>) -> Self {
        ResolveEngine {
            resolver,
            conflict_manager: Arc::new(LatestConflictManager::default()),
            data: ResolveData::default(),
            previous: DashMap::new(),
        }
    }

    pub fn with_conflict_manager(mut self, conflict_manager: Arc<dyn ConflictManager>) -> Self {
        self.conflict_manager = conflict_manager;
        self
    }

    /// Version matching, latest strategy and statuses used for every lookup.
    pub fn with_resolve_data(mut self, data: ResolveData) -> Self {
        self.data = data;
        self
    }

    pub fn resolver(&self) -> &Arc<dyn DependencyResolver> {
        &self.resolver
    }

    pub fn conflict_manager(&self) -> &Arc<dyn ConflictManager> {
        &self.conflict_manager
    }

    /// Resolves a single module as if some caller depended on it in the
    /// requested configurations.
    pub fn resolve_module(
        &self,
        mrid: &ModuleRevisionId,
        options: &ResolveOptions,
    ) -> Result<ResolveReport, ResolveError> {
        let caller_id = ModuleRevisionId::new(
            mrid.organisation(),
            format!("{}-caller", mrid.name()),
            "working",
        );
        let targets = if options.confs.is_empty() {
            ANY_CONFIGURATION.to_string()
        } else {
            options.confs.join(",")
        };
        let dependency = DependencyDescriptor::new(caller_id.clone(), mrid.clone())
            .with_conf_mapping(&format!("{DEFAULT_CONFIGURATION}->{targets}"))?;
        let mut caller = ModuleDescriptor::new(caller_id);
        caller.dependencies.push(dependency);

        let options = ResolveOptions {
            confs: vec![DEFAULT_CONFIGURATION.to_string()],
            resolve_id: options
                .resolve_id
                .clone()
                .or_else(|| Some(mrid.module_id().to_string())),
            ..options.clone()
        };
        self.resolve(&caller, &options)
    }

    pub fn resolve(
        &self,
        root: &ModuleDescriptor,
        options: &ResolveOptions,
    ) -> Result<ResolveReport, ResolveError> {
        let start = Instant::now();
        let confs = root_configurations(root, &options.confs)?;
        let data = ResolveData {
            check_modified: options.check_modified,
            current: None,
            ..self.data.clone()
        };
        info!(
            "Resolving {} [{}]",
            root.module_revision_id,
            confs.join(", ")
        );

        let mut session = Session::default();
        let mut configurations = BTreeMap::new();
        let mut edges = BTreeSet::new();
        for conf in confs {
            let report =
                self.resolve_configuration(root, &conf, options, &data, &mut session, &mut edges)?;
            configurations.insert(conf, report);
        }

        let resolve_id = options
            .resolve_id
            .clone()
            .unwrap_or_else(|| root.module_id().to_string());
        let dependencies_changed = self
            .previous
            .insert(resolve_id.clone(), edges.clone())
            .map_or(true, |previous| previous != edges);

        let report = ResolveReport {
            root: root.module_revision_id.clone(),
            resolve_id,
            configurations,
            dependencies_changed,
            elapsed: start.elapsed(),
        };
        info!(
            "Resolved {} in {:?}{}",
            report.root,
            report.elapsed,
            if report.has_errors() { " with errors" } else { "" }
        );
        Ok(report)
    }

    fn resolve_configuration(
        &self,
        root: &ModuleDescriptor,
        conf: &str,
        options: &ResolveOptions,
        data: &ResolveData,
        session: &mut Session,
        edges: &mut BTreeSet<(ModuleRevisionId, ModuleRevisionId)>,
    ) -> Result<ConfigurationResolveReport, ResolveError> {
        let mut evicted: BTreeMap<ModuleRevisionId, EvictionRecord> = BTreeMap::new();
        let outcome = loop {
            let outcome = Walk::new(self, options, data, session, &evicted).run(root, conf)?;
            let evictions = self.detect_conflicts(&outcome, &evicted)?;
            if evictions.is_empty() {
                break outcome;
            }
            for record in evictions {
                evicted.insert(record.evicted.clone(), record);
            }
        };

        if options.halt_on_failure {
            if let Some(failure) = outcome.failures.first() {
                return Err(ResolveError::Unresolved(failure.clone()));
            }
        }

        let mut report = ConfigurationResolveReport::new(conf);
        if options.download {
            for node in outcome.nodes.values() {
                let reports = self.download(node, options, session)?;
                report.artifacts.extend(reports);
            }
        }
        edges.extend(outcome.edges);
        report.modules = outcome
            .nodes
            .into_values()
            .map(|node| ResolvedModule {
                id: node.resolved.id().clone(),
                resolver: node.resolved.resolver.clone(),
                default: node.resolved.is_default(),
                requested: node.requested,
                callers: node.callers,
                configurations: node.confs,
            })
            .collect();
        report.evicted = evicted.into_values().collect();
        report.failures = outcome.failures;
        report.circular = outcome.circular;
        debug!(
            "{}: {} modules, {} evicted, {} failures",
            conf,
            report.modules.len(),
            report.evicted.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Revisions to evict after a walk, without those already evicted.
    fn detect_conflicts(
        &self,
        outcome: &WalkOutcome,
        evicted: &BTreeMap<ModuleRevisionId, EvictionRecord>,
    ) -> Result<Vec<EvictionRecord>, ResolveError> {
        let mut by_module: BTreeMap<&ModuleId, Vec<&Node>> = BTreeMap::new();
        for node in outcome.nodes.values() {
            by_module
                .entry(node.resolved.id().module_id())
                .or_default()
                .push(node);
        }

        let mut evictions = vec![];
        for (module_id, nodes) in by_module.into_iter().filter(|(_, nodes)| nodes.len() > 1) {
            let candidates: Vec<ConflictCandidate> = nodes
                .iter()
                .map(|node| ConflictCandidate {
                    id: node.resolved.id().clone(),
                    forced: node.forced,
                    publication: node.resolved.descriptor.publication,
                    status: node.resolved.descriptor.status.clone(),
                })
                .collect();
            let winners = self.conflict_manager.resolve_conflicts(&candidates)?;
            for node in nodes {
                let id = node.resolved.id();
                if winners.contains(id) || evicted.contains_key(id) {
                    continue;
                }
                let winner = winners.first().cloned();
                info!(
                    "Evicting {} in favor of {} ({} conflict manager)",
                    id,
                    winner.as_ref().map_or("nothing".to_string(), ToString::to_string),
                    self.conflict_manager.name()
                );
                evictions.push(EvictionRecord {
                    evicted: id.clone(),
                    winner,
                    conflict_manager: self.conflict_manager.name().to_string(),
                    parent: node
                        .callers
                        .first()
                        .cloned()
                        .unwrap_or_else(|| ModuleRevisionId::from_module_id(module_id.clone(), "")),
                });
            }
        }
        Ok(evictions)
    }

    fn download(
        &self,
        node: &Node,
        options: &ResolveOptions,
        session: &mut Session,
    ) -> Result<Vec<ArtifactDownloadReport>, ResolveError> {
        let mut artifacts = BTreeSet::new();
        for conf in &node.confs {
            for artifact in node.resolved.descriptor.artifacts_for(conf)? {
                if node.dependencies.iter().any(|dd| dd.accepts_artifact(&artifact)) {
                    artifacts.insert(artifact);
                }
            }
        }

        let pending: Vec<Artifact> = artifacts
            .iter()
            .filter(|a| !session.downloads.contains_key(*a))
            .cloned()
            .collect();
        if !pending.is_empty() {
            let download_options = DownloadOptions {
                use_origin: options.use_origin,
            };
            let report = node
                .resolved
                .artifact_resolver
                .download(&pending, &download_options);
            for artifact in report.artifacts {
                if artifact.status == DownloadStatus::Failed {
                    let reason = artifact.error.clone().unwrap_or_default();
                    warn!("Failed to download {}: {}", artifact.artifact, reason);
                    if options.halt_on_failure {
                        return Err(ResolveError::Download {
                            artifact: artifact.artifact.to_string(),
                            reason,
                        });
                    }
                }
                session.downloads.insert(artifact.artifact.clone(), artifact);
            }
        }

        Ok(artifacts
            .iter()
            .filter_map(|a| session.downloads.get(a).cloned())
            .collect())
    }
}

fn root_configurations(
    root: &ModuleDescriptor,
    requested: &[String],
) -> Result<Vec<String>, ResolveError> {
    let mut confs: Vec<String> = vec![];
    let mut push = |conf: &str| {
        if !confs.iter().any(|c| c == conf) {
            confs.push(conf.to_string());
        }
    };
    if requested.is_empty() {
        root.public_configurations().into_iter().for_each(&mut push);
    }
    for conf in requested {
        if conf == ANY_CONFIGURATION {
            root.public_configurations().into_iter().for_each(&mut push);
        } else if root.configuration(conf).is_some() {
            push(conf);
        } else {
            return Err(ResolveError::UnknownConfiguration {
                conf: conf.clone(),
                module: root.module_revision_id.to_string(),
            });
        }
    }
    Ok(confs)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    dependency: ModuleRevisionId,
    force: bool,
    changing: bool,
}

#[derive(Debug, Clone)]
enum Lookup {
    Found(ResolvedModuleRevision),
    NotFound,
    Failed(String),
}

/// Lookups and downloads shared by every walk of one resolution.
#[derive(Debug, Default)]
struct Session {
    lookups: HashMap<LookupKey, Lookup>,
    known: HashMap<ModuleRevisionId, ResolvedModuleRevision>,
    downloads: HashMap<Artifact, ArtifactDownloadReport>,
}

#[derive(Debug)]
struct Node {
    resolved: ResolvedModuleRevision,
    requested: BTreeSet<ModuleRevisionId>,
    callers: BTreeSet<ModuleRevisionId>,
    confs: BTreeSet<String>,
    /// Edges leading here; their include and exclude rules filter artifacts.
    dependencies: Vec<DependencyDescriptor>,
    forced: bool,
}

impl Node {
    fn new(resolved: ResolvedModuleRevision) -> Self {
        Node {
            resolved,
            requested: BTreeSet::new(),
            callers: BTreeSet::new(),
            confs: BTreeSet::new(),
            dependencies: vec![],
            forced: false,
        }
    }
}

#[derive(Debug, Default)]
struct WalkOutcome {
    nodes: BTreeMap<ModuleRevisionId, Node>,
    failures: Vec<DependencyFailure>,
    circular: Vec<CircularDependency>,
    edges: BTreeSet<(ModuleRevisionId, ModuleRevisionId)>,
}

struct Walk<'a> {
    engine: &'a ResolveEngine,
    options: &'a ResolveOptions,
    data: &'a ResolveData,
    session: &'a mut Session,
    evicted: &'a BTreeMap<ModuleRevisionId, EvictionRecord>,
    visited: HashSet<(ModuleRevisionId, String, Vec<ArtifactRule>)>,
    ancestors: Vec<ModuleId>,
    outcome: WalkOutcome,
}

impl<'a> Walk<'a> {
    fn new(
        engine: &'a ResolveEngine,
        options: &'a ResolveOptions,
        data: &'a ResolveData,
        session: &'a mut Session,
        evicted: &'a BTreeMap<ModuleRevisionId, EvictionRecord>,
    ) -> Self {
        Walk {
            engine,
            options,
            data,
            session,
            evicted,
            visited: HashSet::new(),
            ancestors: vec![],
            outcome: WalkOutcome::default(),
        }
    }

    fn run(mut self, root: &ModuleDescriptor, conf: &str) -> Result<WalkOutcome, ResolveError> {
        self.visit(root, conf, &[])?;
        Ok(self.outcome)
    }

    fn visit(
        &mut self,
        md: &ModuleDescriptor,
        conf: &str,
        excludes: &[ArtifactRule],
    ) -> Result<(), ResolveError> {
        let key = (
            md.module_revision_id.clone(),
            conf.to_string(),
            excludes.to_vec(),
        );
        if !self.visited.insert(key) {
            return Ok(());
        }
        self.ancestors.push(md.module_id().clone());
        let result = self.visit_dependencies(md, conf, excludes);
        self.ancestors.pop();
        result
    }

    fn visit_dependencies(
        &mut self,
        md: &ModuleDescriptor,
        conf: &str,
        excludes: &[ArtifactRule],
    ) -> Result<(), ResolveError> {
        let parent = &md.module_revision_id;
        let transitive = self.options.transitive
            && md.configuration(conf).map_or(true, |c| c.transitive);

        for (dd, targets) in md.dependencies_for(conf)? {
            let module_id = dd.dependency.module_id();
            if excludes
                .iter()
                .any(|rule| rule.is_module_wide() && rule.matches_module(module_id))
            {
                debug!("{} excluded below {}", dd.dependency, parent);
                continue;
            }
            if let Some(position) = self.ancestors.iter().position(|a| a == module_id) {
                self.circular(position, module_id);
                continue;
            }
            let Some(resolved) = self.find(parent, dd)? else {
                continue;
            };

            let child = resolved.descriptor.clone();
            let id = resolved.id().clone();
            let (present, missing): (Vec<String>, Vec<String>) = child
                .select_configurations(&targets)
                .into_iter()
                .partition(|target| child.configuration(target).is_some());

            let node = self
                .outcome
                .nodes
                .entry(id.clone())
                .or_insert_with(|| Node::new(resolved));
            node.requested.insert(dd.dependency.clone());
            node.callers.insert(parent.clone());
            node.forced |= dd.force;
            node.confs.extend(present.iter().cloned());
            if !node.dependencies.contains(dd) {
                node.dependencies.push(dd.clone());
            }
            self.outcome.edges.insert((parent.clone(), id.clone()));

            for target in missing {
                self.fail(
                    &dd.dependency,
                    parent,
                    format!("configuration `{target}` not found in {id}"),
                );
            }
            if !(transitive && dd.transitive) {
                continue;
            }
            let mut inherited = excludes.to_vec();
            for rule in dd.excludes.iter().filter(|r| r.is_module_wide()) {
                if !inherited.contains(rule) {
                    inherited.push(rule.clone());
                }
            }
            for target in present {
                self.visit(&child, &target, &inherited)?;
            }
        }
        Ok(())
    }

    fn circular(&mut self, position: usize, module_id: &ModuleId) {
        let mut path = self.ancestors[position..].to_vec();
        path.push(module_id.clone());
        let circular = CircularDependency { path };
        if !self.outcome.circular.contains(&circular) {
            warn!("Circular dependency: {circular}");
            self.outcome.circular.push(circular);
        }
    }

    fn find(
        &mut self,
        parent: &ModuleRevisionId,
        dd: &DependencyDescriptor,
    ) -> Result<Option<ResolvedModuleRevision>, ResolveError> {
        let key = LookupKey {
            dependency: dd.dependency.clone(),
            force: dd.force,
            changing: dd.changing,
        };
        let lookup = match self.session.lookups.get(&key) {
            Some(lookup) => lookup.clone(),
            None => {
                let lookup = self.lookup(dd)?;
                self.session.lookups.insert(key, lookup.clone());
                lookup
            }
        };
        match lookup {
            Lookup::Found(resolved) => Ok(Some(self.redirect(resolved))),
            Lookup::NotFound => {
                self.fail(&dd.dependency, parent, "not found".to_string());
                Ok(None)
            }
            Lookup::Failed(reason) => {
                self.fail(&dd.dependency, parent, reason);
                Ok(None)
            }
        }
    }

    fn lookup(&mut self, dd: &DependencyDescriptor) -> Result<Lookup, ResolveError> {
        debug!("Looking up {}", dd.dependency);
        match self.engine.resolver.get_dependency(dd, self.data) {
            Ok(Some(resolved)) => {
                info!("Found {} in {}", resolved.id(), resolved.resolver);
                self.session
                    .known
                    .insert(resolved.id().clone(), resolved.clone());
                Ok(Lookup::Found(resolved))
            }
            Ok(None) => Ok(Lookup::NotFound),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => Ok(Lookup::Failed(err.to_string())),
        }
    }

    /// Follows evictions to the revision that replaced `resolved`.
    fn redirect(&self, mut resolved: ResolvedModuleRevision) -> ResolvedModuleRevision {
        for _ in 0..=self.evicted.len() {
            let Some(record) = self.evicted.get(resolved.id()) else {
                break;
            };
            let Some(winner) = record
                .winner
                .as_ref()
                .and_then(|winner| self.session.known.get(winner))
            else {
                break;
            };
            debug!("{} was evicted, using {}", resolved.id(), winner.id());
            resolved = winner.clone();
        }
        resolved
    }

    fn fail(&mut self, requested: &ModuleRevisionId, parent: &ModuleRevisionId, reason: String) {
        let failure = DependencyFailure {
            requested: requested.clone(),
            parent: parent.clone(),
            reason,
        };
        if !self.outcome.failures.contains(&failure) {
            warn!("Unresolved dependency {failure}");
            self.outcome.failures.push(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        model::{Configuration, DeclaredArtifact},
        resolver::testing::{descriptor, MockResolver},
    };

    fn mrid(name: &str, rev: &str) -> ModuleRevisionId {
        ModuleRevisionId::new("org", name, rev)
    }

    fn module(name: &str, rev: &str, dependencies: &[(&str, &str)]) -> ModuleDescriptor {
        let mut md = descriptor("org", name, rev, 0);
        for (dep, dep_rev) in dependencies {
            md.dependencies.push(DependencyDescriptor::new(
                md.module_revision_id.clone(),
                mrid(dep, dep_rev),
            ));
        }
        md
    }

    fn engine(resolver: &MockResolver) -> ResolveEngine {
        ResolveEngine::new(Arc::new(resolver.clone()))
    }

    fn revisions(report: &ConfigurationResolveReport) -> Vec<String> {
        report.modules.iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn resolves_transitive_dependencies() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("b", "1.0")]))
            .with_module(module("b", "1.0", &[]));
        let root = module("root", "1", &[("a", "1.0")]);

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(revisions(default), vec!["org#a;1.0", "org#b;1.0"]);
        assert_eq!(
            default.module(mrid("b", "1.0").module_id()).unwrap().callers,
            BTreeSet::from([mrid("a", "1.0")])
        );
        assert!(!report.has_errors());
    }

    #[test]
    fn forced_revision_evicts_newer_one() {
        let resolver = MockResolver::new("mock")
            .with_module(module("x", "1.0", &[]))
            .with_module(module("x", "2.0", &[]))
            .with_module(module("y", "1.0", &[("x", "2.0")]));
        let mut root = module("root", "1", &[("y", "1.0")]);
        root.dependencies.push(
            DependencyDescriptor::new(root.module_revision_id.clone(), mrid("x", "1.0"))
                .with_force(true),
        );

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(revisions(default), vec!["org#x;1.0", "org#y;1.0"]);
        assert_eq!(
            default.evicted,
            vec![EvictionRecord {
                evicted: mrid("x", "2.0"),
                winner: Some(mrid("x", "1.0")),
                conflict_manager: "latest-revision".to_string(),
                parent: mrid("y", "1.0"),
            }]
        );
        assert_eq!(default.state(&mrid("x", "2.0")), Some(ModuleState::Evicted));
        assert_eq!(default.state(&mrid("x", "1.0")), Some(ModuleState::Resolved));
        let x = default.module(mrid("x", "1.0").module_id()).unwrap();
        assert_eq!(
            x.callers,
            BTreeSet::from([mrid("root", "1"), mrid("y", "1.0")])
        );
    }

    #[test]
    fn evicted_revision_takes_its_dependencies_along() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("c", "1.0")]))
            .with_module(module("b", "1.0", &[("c", "2.0")]))
            .with_module(module("c", "1.0", &[("old", "1.0")]))
            .with_module(module("c", "2.0", &[]))
            .with_module(module("old", "1.0", &[]));
        let root = module("root", "1", &[("a", "1.0"), ("b", "1.0")]);

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(
            revisions(default),
            vec!["org#a;1.0", "org#b;1.0", "org#c;2.0"]
        );
        let eviction = default.eviction(&mrid("c", "1.0")).unwrap();
        assert_eq!(eviction.parent, mrid("a", "1.0"));
        assert_eq!(eviction.winner, Some(mrid("c", "2.0")));
    }

    #[test]
    fn strict_conflict_manager_fails() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("c", "1.0")]))
            .with_module(module("c", "1.0", &[]))
            .with_module(module("c", "2.0", &[]));
        let root = module("root", "1", &[("a", "1.0"), ("c", "2.0")]);

        let err = engine(&resolver)
            .with_conflict_manager(Arc::new(StrictConflictManager::default()))
            .resolve(&root, &ResolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, ResolveError::Conflict(_)), "{err}");
    }

    #[test]
    fn all_conflict_manager_keeps_both() {
        let resolver = MockResolver::new("mock")
            .with_module(module("c", "1.0", &[]))
            .with_module(module("c", "2.0", &[]));
        let root = module("root", "1", &[("c", "1.0"), ("c", "2.0")]);

        let report = engine(&resolver)
            .with_conflict_manager(Arc::new(AllConflictManager))
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        assert_eq!(
            revisions(report.configuration("default").unwrap()),
            vec!["org#c;1.0", "org#c;2.0"]
        );
    }

    #[test]
    fn circular_dependencies_are_reported() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("b", "1.0")]))
            .with_module(module("b", "1.0", &[("a", "1.0")]));
        let root = module("root", "1", &[("a", "1.0")]);

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(revisions(default), vec!["org#a;1.0", "org#b;1.0"]);
        let circular: Vec<String> = default.circular.iter().map(ToString::to_string).collect();
        assert_eq!(circular, vec!["org#a -> org#b -> org#a"]);
    }

    #[test]
    fn self_dependency_is_circular() {
        let resolver =
            MockResolver::new("mock").with_module(module("a", "1.0", &[("a", "1.0")]));
        let root = module("root", "1", &[("a", "1.0")]);

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(revisions(default), vec!["org#a;1.0"]);
        assert_eq!(
            default.circular,
            vec![CircularDependency {
                path: vec![ModuleId::new("org", "a"), ModuleId::new("org", "a")],
            }]
        );
    }

    #[test]
    fn longer_cycles_report_the_whole_path() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("b", "1.0")]))
            .with_module(module("b", "1.0", &[("c", "1.0")]))
            .with_module(module("c", "1.0", &[("a", "1.0")]));
        let root = module("root", "1", &[("a", "1.0")]);

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(revisions(default), vec!["org#a;1.0", "org#b;1.0", "org#c;1.0"]);
        let circular: Vec<String> = default.circular.iter().map(ToString::to_string).collect();
        assert_eq!(circular, vec!["org#a -> org#b -> org#c -> org#a"]);
    }

    #[test]
    fn each_request_is_looked_up_once() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("c", "1.0")]))
            .with_module(module("b", "1.0", &[("c", "1.0")]))
            .with_module(module("c", "1.0", &[]));
        let root = module("root", "1", &[("a", "1.0"), ("b", "1.0")]);

        engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let asked_c = resolver
            .asked()
            .iter()
            .filter(|asked| asked.name() == "c")
            .count();
        assert_eq!(asked_c, 1);
    }

    #[test]
    fn unknown_root_configuration() {
        let resolver = MockResolver::new("mock");
        let root = module("root", "1", &[]);
        let err = engine(&resolver)
            .resolve(&root, &ResolveOptions::default().with_confs(["compile"]))
            .unwrap_err();
        assert!(
            matches!(err, ResolveError::UnknownConfiguration { ref conf, .. } if conf == "compile")
        );
        assert!(resolver.asked().is_empty());
    }

    #[test]
    fn missing_dependency_halts_or_is_reported() {
        let resolver = MockResolver::new("mock");
        let root = module("root", "1", &[("missing", "1.0")]);
        let engine = engine(&resolver);

        let err = engine
            .resolve(&root, &ResolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved(_)));

        let report = engine
            .resolve(
                &root,
                &ResolveOptions::default().with_halt_on_failure(false),
            )
            .unwrap();
        let default = report.configuration("default").unwrap();
        assert_eq!(
            default.failures,
            vec![DependencyFailure {
                requested: mrid("missing", "1.0"),
                parent: mrid("root", "1"),
                reason: "not found".to_string(),
            }]
        );
        assert_eq!(
            default.state(&mrid("missing", "1.0")),
            Some(ModuleState::Failed)
        );
        assert!(report.has_errors());
    }

    #[test]
    fn resolver_errors_abort() {
        let resolver = MockResolver::new("mock").failing();
        let root = module("root", "1", &[("a", "1.0")]);
        let err = engine(&resolver)
            .resolve(
                &root,
                &ResolveOptions::default().with_halt_on_failure(false),
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::Resolver(_)));
    }

    #[test]
    fn missing_target_configuration_is_a_failure() {
        let resolver = MockResolver::new("mock").with_module(module("a", "1.0", &[]));
        let mut root = module("root", "1", &[]);
        root.dependencies.push(
            DependencyDescriptor::new(root.module_revision_id.clone(), mrid("a", "1.0"))
                .with_conf_mapping("default->sources")
                .unwrap(),
        );

        let report = engine(&resolver)
            .resolve(
                &root,
                &ResolveOptions::default().with_halt_on_failure(false),
            )
            .unwrap();
        let failures: Vec<String> = report.failures().map(|f| f.reason.clone()).collect();
        assert_eq!(
            failures,
            vec!["configuration `sources` not found in org#a;1.0"]
        );
    }

    #[test]
    fn excluded_modules_are_not_walked() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("b", "1.0")]))
            .with_module(module("b", "1.0", &[("c", "1.0")]))
            .with_module(module("c", "1.0", &[]));
        let mut root = module("root", "1", &[]);
        root.dependencies.push(
            DependencyDescriptor::new(root.module_revision_id.clone(), mrid("a", "1.0"))
                .with_exclude(ArtifactRule::module("org", "c")),
        );

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        assert_eq!(
            revisions(report.configuration("default").unwrap()),
            vec!["org#a;1.0", "org#b;1.0"]
        );
    }

    #[test]
    fn non_transitive_resolution() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("b", "1.0")]))
            .with_module(module("b", "1.0", &[]));
        let root = module("root", "1", &[("a", "1.0")]);
        let engine = engine(&resolver);

        let report = engine
            .resolve(&root, &ResolveOptions::default().with_transitive(false))
            .unwrap();
        assert_eq!(
            revisions(report.configuration("default").unwrap()),
            vec!["org#a;1.0"]
        );

        let mut intransitive = root.clone();
        intransitive.dependencies[0] = intransitive.dependencies[0].clone().with_transitive(false);
        let report = engine
            .resolve(&intransitive, &ResolveOptions::default())
            .unwrap();
        assert_eq!(
            revisions(report.configuration("default").unwrap()),
            vec!["org#a;1.0"]
        );
    }

    #[test]
    fn configurations_select_dependencies() {
        let resolver = MockResolver::new("mock")
            .with_module(module("junit", "4.0", &[]))
            .with_module(module("lib", "1.0", &[]));
        let mut root = module("root", "1", &[]);
        root.configurations = vec![
            Configuration::new("compile"),
            Configuration::new("test").extending(["compile"]),
        ];
        let id = root.module_revision_id.clone();
        root.dependencies = vec![
            DependencyDescriptor::new(id.clone(), mrid("lib", "1.0"))
                .with_conf_mapping("compile->default")
                .unwrap(),
            DependencyDescriptor::new(id, mrid("junit", "4.0"))
                .with_conf_mapping("test->default")
                .unwrap(),
        ];

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default().with_confs(["*"]))
            .unwrap();
        assert_eq!(
            revisions(report.configuration("compile").unwrap()),
            vec!["org#lib;1.0"]
        );
        assert_eq!(
            revisions(report.configuration("test").unwrap()),
            vec!["org#junit;4.0", "org#lib;1.0"]
        );
    }

    #[test]
    fn downloads_accepted_artifacts() {
        let mut a = module("a", "1.0", &[]);
        a.artifacts = vec![
            DeclaredArtifact::new("a", "jar", "jar"),
            DeclaredArtifact::new("a-sources", "source", "jar"),
        ];
        let resolver = MockResolver::new("mock").with_module(a);
        let mut root = module("root", "1", &[]);
        root.dependencies.push(
            DependencyDescriptor::new(root.module_revision_id.clone(), mrid("a", "1.0"))
                .with_exclude(ArtifactRule {
                    artifact: "*-sources".to_string(),
                    ..ArtifactRule::module("*", "*")
                }),
        );

        let report = engine(&resolver)
            .resolve(&root, &ResolveOptions::default())
            .unwrap();
        let downloaded: Vec<String> = resolver.downloaded().iter().map(|a| a.name.clone()).collect();
        assert_eq!(downloaded, vec!["a"]);
        let default = report.configuration("default").unwrap();
        assert_eq!(default.download_count(DownloadStatus::Successful), 1);
    }

    #[test]
    fn dependencies_changed_between_resolutions() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[]))
            .with_module(module("a", "2.0", &[]));
        let engine = engine(&resolver);
        let options = ResolveOptions::default();

        let root = module("root", "1", &[("a", "1.0")]);
        assert!(engine.resolve(&root, &options).unwrap().dependencies_changed);
        assert!(!engine.resolve(&root, &options).unwrap().dependencies_changed);

        let upgraded = module("root", "1", &[("a", "2.0")]);
        assert!(engine.resolve(&upgraded, &options).unwrap().dependencies_changed);

        let other = options.clone().with_resolve_id("other");
        assert!(engine.resolve(&upgraded, &other).unwrap().dependencies_changed);
    }

    #[test]
    fn resolve_single_module() {
        let resolver = MockResolver::new("mock")
            .with_module(module("a", "1.0", &[("b", "1.0")]))
            .with_module(module("b", "1.0", &[]));
        let report = engine(&resolver)
            .resolve_module(&mrid("a", "1.0"), &ResolveOptions::default())
            .unwrap();
        assert_eq!(report.resolve_id, "org#a");
        assert_eq!(
            revisions(report.configuration("default").unwrap()),
            vec!["org#a;1.0", "org#b;1.0"]
        );
    }
}
