//! Copies resolved artifacts out of the cache into a project layout.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::{
    resolve::ResolveReport,
    resolver::{substitute, DownloadStatus},
};

pub const DEFAULT_RETRIEVE_PATTERN: &str = "lib/[conf]/[artifact]-[revision].[ext]";
const CONF_TOKEN: &str = "conf";
const DEFAULT_PARALLELISM: usize = 8;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("Artifacts {first} and {second} would both be retrieved to {destination}")]
    Collision {
        first: String,
        second: String,
        destination: PathBuf,
    },
    #[error("IO error while copying {source_path} to {destination}: {error}")]
    Copy {
        source_path: PathBuf,
        destination: PathBuf,
        error: std::io::Error,
    },
    #[error("Retrieve task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Destination of each artifact relative to `destination`; accepts the
    /// artifact tokens plus `[conf]`.
    pub pattern: String,
    pub destination: PathBuf,
    /// Configurations to retrieve; empty means every resolved one.
    pub confs: Vec<String>,
    /// Copies running at the same time.
    pub parallelism: usize,
}

impl RetrieveOptions {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        RetrieveOptions {
            pattern: DEFAULT_RETRIEVE_PATTERN.to_string(),
            destination: destination.into(),
            confs: vec![],
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_confs(mut self, confs: Vec<String>) -> Self {
        self.confs = confs;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveReport {
    pub copied: Vec<PathBuf>,
    pub up_to_date: Vec<PathBuf>,
}

#[derive(Debug)]
struct PlannedCopy {
    artifact: String,
    source: PathBuf,
    destination: PathBuf,
}

enum Outcome {
    Copied(PathBuf),
    UpToDate(PathBuf),
}

/// Plans one copy per destination. Two different files landing on the same
/// destination is an error; the same file requested twice is copied once.
fn plan(report: &ResolveReport, options: &RetrieveOptions) -> Result<Vec<PlannedCopy>, RetrieveError> {
    let mut copies: BTreeMap<PathBuf, PlannedCopy> = BTreeMap::new();
    for (conf, conf_report) in &report.configurations {
        if !options.confs.is_empty() && !options.confs.contains(conf) {
            continue;
        }
        for artifact in &conf_report.artifacts {
            let Some(source) = artifact.local_file.as_ref() else {
                if artifact.status == DownloadStatus::Failed {
                    warn!("Skipping {}, it was not downloaded", artifact.artifact);
                }
                continue;
            };
            let mut attributes = artifact.artifact.attributes();
            attributes.insert(CONF_TOKEN, conf);
            let destination = options
                .destination
                .join(substitute(&options.pattern, &attributes));

            match copies.get(&destination) {
                Some(existing) if &existing.source != source => {
                    return Err(RetrieveError::Collision {
                        first: existing.artifact.clone(),
                        second: artifact.artifact.to_string(),
                        destination,
                    });
                }
                Some(_) => {}
                None => {
                    copies.insert(
                        destination.clone(),
                        PlannedCopy {
                            artifact: artifact.artifact.to_string(),
                            source: source.clone(),
                            destination,
                        },
                    );
                }
            }
        }
    }
    Ok(copies.into_values().collect())
}

/// Copies every downloaded artifact of the report, skipping destinations
/// that are already up to date.
pub async fn retrieve(
    report: &ResolveReport,
    options: &RetrieveOptions,
) -> Result<RetrieveReport, RetrieveError> {
    let copies = plan(report, options)?;
    info!(
        "Retrieving {} artifacts to {}",
        copies.len(),
        options.destination.display()
    );

    let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
    let mut handles = Vec::with_capacity(copies.len());
    for copy in copies {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            copy_if_newer(&copy.source, &copy.destination).await
        }));
    }

    let mut result = RetrieveReport::default();
    for handle in handles {
        match handle.await?? {
            Outcome::Copied(path) => result.copied.push(path),
            Outcome::UpToDate(path) => result.up_to_date.push(path),
        }
    }
    info!(
        "{} artifacts copied, {} already up to date",
        result.copied.len(),
        result.up_to_date.len()
    );
    Ok(result)
}

async fn copy_if_newer(source: &Path, destination: &Path) -> Result<Outcome, RetrieveError> {
    let io_error = |error| RetrieveError::Copy {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        error,
    };
    let source_metadata = tokio::fs::metadata(source).await.map_err(io_error)?;
    if let Ok(existing) = tokio::fs::metadata(destination).await {
        let newer = match (existing.modified(), source_metadata.modified()) {
            (Ok(existing), Ok(source)) => existing >= source,
            _ => false,
        };
        if existing.len() == source_metadata.len() && newer {
            debug!("{} is up to date", destination.display());
            return Ok(Outcome::UpToDate(destination.to_path_buf()));
        }
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::copy(source, destination).await.map_err(io_error)?;
    debug!("Copied {} to {}", source.display(), destination.display());
    Ok(Outcome::Copied(destination.to_path_buf()))
}
