use log::{debug, info};

use crate::{
    cache::{now_millis, RepositoryCacheManager},
    model::{Artifact, ModuleDescriptor, ModuleId, ModuleRevisionId},
    resolve::{ResolveEngine, ResolveOptions, ResolveReport},
    resolver::{substitute, DependencyResolver, PublishTransaction},
    retrieve::{self, RetrieveOptions, RetrieveReport},
};
use std::{
    error::Error,
    path::{Path, PathBuf},
};

pub const DEFAULT_PUBLISH_PATTERN: &str = "[artifact].[ext]";

/// Handler to resolve command
/// Resolves the dependencies of the module descriptor, or of a single
/// module when one is given
pub fn do_resolve(
    engine: &ResolveEngine,
    root: &Path,
    module_file_name: &Path,
    module: Option<&ModuleRevisionId>,
    options: &ResolveOptions,
) -> Result<ResolveReport, Box<dyn Error>> {
    let report = match module {
        Some(mrid) => engine.resolve_module(mrid, options)?,
        None => {
            let module_descriptor = load_module_descriptor(root, module_file_name)?;
            engine.resolve(&module_descriptor, options)?
        }
    };

    for (conf, conf_report) in &report.configurations {
        info!(
            "{}: {} modules, {} evicted, {} artifacts",
            conf,
            conf_report.modules.len(),
            conf_report.evicted.len(),
            conf_report.artifacts.len()
        );
        for failure in &conf_report.failures {
            info!("{}: unresolved {}", conf, failure);
        }
        for circular in &conf_report.circular {
            info!("{}: circular dependency {}", conf, circular);
        }
    }
    if report.has_errors() {
        return Err(format!("Resolution of {} failed", report.root).into());
    }

    Ok(report)
}

/// Handler to retrieve command
/// Resolves, then copies every artifact into the project
pub fn do_retrieve(
    engine: &ResolveEngine,
    root: &Path,
    module_file_name: &Path,
    resolve_options: &ResolveOptions,
    retrieve_options: RetrieveOptions,
) -> Result<RetrieveReport, Box<dyn Error>> {
    let report = do_resolve(engine, root, module_file_name, None, resolve_options)?;
    let retrieve_options = RetrieveOptions {
        destination: root.join(&retrieve_options.destination),
        ..retrieve_options
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().build()?;
    let retrieved = runtime.block_on(retrieve::retrieve(&report, &retrieve_options))?;

    Ok(retrieved)
}

/// Handler to publish command
/// 1 - Reads the module descriptor and stamps revision, status and publication
/// 2 - Publishes every declared artifact found in the artifacts directory
/// 3 - Publishes the delivered descriptor and commits
pub fn do_publish(
    resolver: &dyn DependencyResolver,
    root: &Path,
    module_file_name: &Path,
    artifacts_directory: &Path,
    revision: Option<&str>,
    status: Option<&str>,
    overwrite: bool,
) -> Result<ModuleRevisionId, Box<dyn Error>> {
    let mut descriptor = load_module_descriptor(root, module_file_name)?;
    if let Some(revision) = revision {
        descriptor.module_revision_id = descriptor.module_revision_id.with_revision(revision);
    }
    if let Some(status) = status {
        descriptor.status = status.to_string();
    }
    descriptor.publication = now_millis();
    let mrid = descriptor.module_revision_id.clone();
    let artifacts_directory = root.join(artifacts_directory);

    let delivered = artifacts_directory.join(format!("module-{}.toml", mrid.revision()));
    std::fs::write(&delivered, descriptor.to_toml_string()?)?;
    debug!("Delivered descriptor to {}", delivered.display());

    info!("Publishing {} to {}", mrid, resolver.name());
    let transaction = PublishTransaction::begin(resolver, &mrid, overwrite)?;
    for declared in &descriptor.artifacts {
        let mut artifact = Artifact::new(
            mrid.clone(),
            declared.name.clone(),
            declared.kind.clone(),
            declared.ext.clone(),
        )
        .with_publication(descriptor.publication);
        artifact.extra = declared.extra.clone();
        let source = artifacts_directory.join(substitute(DEFAULT_PUBLISH_PATTERN, &artifact.attributes()));
        transaction.publish(&artifact, &source, overwrite)?;
    }
    transaction.publish(&Artifact::metadata(mrid.clone()), &delivered, overwrite)?;
    transaction.commit()?;
    info!("Published {}", mrid);

    Ok(mrid)
}

/// Handler to list command
/// Organisations, modules of an organisation, or revisions of a module
pub fn do_list(
    resolver: &dyn DependencyResolver,
    organisation: Option<&str>,
    module: Option<&str>,
) -> Result<Vec<String>, Box<dyn Error>> {
    let listed = match (organisation, module) {
        (None, None) => resolver.list_organisations()?,
        (Some(organisation), None) => resolver.list_modules(organisation)?,
        (Some(organisation), Some(module)) => {
            resolver.list_revisions(&ModuleId::new(organisation, module))?
        }
        (None, Some(_)) => return Err("Listing revisions requires an organisation".into()),
    };
    Ok(listed)
}

pub fn do_clear_cache(cache: &dyn RepositoryCacheManager) -> Result<(), Box<dyn Error>> {
    cache.clear()?;
    Ok(())
}

fn load_module_descriptor(
    root: &Path,
    module_file_name: &Path,
) -> Result<ModuleDescriptor, Box<dyn Error>> {
    let path: PathBuf = root.join(module_file_name);
    let module_descriptor = ModuleDescriptor::from_file(&path)
        .map_err(|err| format!("Could not read module descriptor {}: {err}", path.display()))?;

    Ok(module_descriptor)
}
