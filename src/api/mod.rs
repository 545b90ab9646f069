use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    cache::DefaultRepositoryCacheManager,
    cli::command_handlers::{do_clear_cache, do_list, do_publish, do_resolve, do_retrieve},
    model::{descriptor::ANY_CONFIGURATION, ModuleRevisionId},
    resolve::{ResolveEngine, ResolveOptions, ResolveReport},
    resolver::DependencyResolver,
    retrieve::{RetrieveOptions, RetrieveReport},
    settings::{Resolvers, Settings},
};

mod builder;

pub use builder::DepchainBuilder;

pub struct Depchain {
    cache: Arc<DefaultRepositoryCacheManager>,
    resolvers: Resolvers,
    engine: ResolveEngine,
    resolve_options: ResolveOptions,
    root: PathBuf,
    module_file_name: PathBuf,
}

/// Where a publication goes and how it is stamped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Target resolver; the settings' default resolver when absent.
    pub resolver: Option<String>,
    pub revision: Option<String>,
    pub status: Option<String>,
    pub overwrite: bool,
}

impl Depchain {
    pub fn builder() -> DepchainBuilder {
        DepchainBuilder::default()
    }

    pub(crate) fn new(
        settings: &Settings,
        cache: Arc<DefaultRepositoryCacheManager>,
        resolve_options: ResolveOptions,
        root: PathBuf,
        module_file_name: PathBuf,
    ) -> Result<Self, Box<dyn Error>> {
        let resolvers = settings.resolvers(cache.clone())?;
        let engine = settings.engine(resolvers.default_resolver().clone())?;
        Ok(Depchain {
            cache,
            resolvers,
            engine,
            resolve_options,
            root,
            module_file_name,
        })
    }

    pub fn engine(&self) -> &ResolveEngine {
        &self.engine
    }

    pub fn cache(&self) -> &DefaultRepositoryCacheManager {
        &self.cache
    }

    /// Resolve options with the environment defaults applied.
    pub fn resolve_options(&self) -> ResolveOptions {
        self.resolve_options.clone()
    }

    /// Resolves the dependencies declared in the module descriptor
    pub fn resolve(&self, options: &ResolveOptions) -> Result<ResolveReport, Box<dyn Error>> {
        do_resolve(&self.engine, &self.root, &self.module_file_name, None, options)
    }

    /// Resolves a single module and its transitive dependencies
    pub fn resolve_module(
        &self,
        module: &ModuleRevisionId,
        options: &ResolveOptions,
    ) -> Result<ResolveReport, Box<dyn Error>> {
        do_resolve(
            &self.engine,
            &self.root,
            &self.module_file_name,
            Some(module),
            options,
        )
    }

    /// Resolves, then copies the artifacts under the project root
    pub fn retrieve(
        &self,
        resolve_options: &ResolveOptions,
        pattern: impl Into<String>,
    ) -> Result<RetrieveReport, Box<dyn Error>> {
        let retrieve_options = RetrieveOptions::new(PathBuf::new())
            .with_pattern(pattern)
            .with_confs(
                resolve_options
                    .confs
                    .iter()
                    .filter(|conf| conf.as_str() != ANY_CONFIGURATION)
                    .cloned()
                    .collect(),
            );
        do_retrieve(
            &self.engine,
            &self.root,
            &self.module_file_name,
            resolve_options,
            retrieve_options,
        )
    }

    /// Publishes the module's artifacts found in `artifacts_directory`
    pub fn publish(
        &self,
        artifacts_directory: impl AsRef<Path>,
        options: &PublishOptions,
    ) -> Result<ModuleRevisionId, Box<dyn Error>> {
        let resolver = self.resolver(options.resolver.as_deref())?;
        do_publish(
            resolver.as_ref(),
            &self.root,
            &self.module_file_name,
            artifacts_directory.as_ref(),
            options.revision.as_deref(),
            options.status.as_deref(),
            options.overwrite,
        )
    }

    /// Organisations, modules of an organisation, or revisions of a module
    pub fn list(
        &self,
        resolver: Option<&str>,
        organisation: Option<&str>,
        module: Option<&str>,
    ) -> Result<Vec<String>, Box<dyn Error>> {
        let resolver = self.resolver(resolver)?;
        do_list(resolver.as_ref(), organisation, module)
    }

    pub fn clear_cache(&self) -> Result<(), Box<dyn Error>> {
        do_clear_cache(self.cache.as_ref())
    }

    fn resolver(&self, name: Option<&str>) -> Result<&Arc<dyn DependencyResolver>, Box<dyn Error>> {
        match name {
            None => Ok(self.resolvers.default_resolver()),
            Some(name) => self.resolvers.get(name).ok_or_else(|| {
                format!(
                    "Unknown resolver `{name}`, expected one of {}",
                    self.resolvers.names().collect::<Vec<_>>().join(", ")
                )
                .into()
            }),
        }
    }
}
