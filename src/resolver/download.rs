use std::{fmt::Display, path::PathBuf};

use crate::model::Artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    /// Freshly transferred.
    Successful,
    /// Nothing to transfer: already cached, or served from its origin.
    No,
    Failed,
}

impl Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::Successful => f.write_str("successful"),
            DownloadStatus::No => f.write_str("no"),
            DownloadStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDownloadReport {
    pub artifact: Artifact,
    pub status: DownloadStatus,
    /// Where the bytes can be read locally.
    pub local_file: Option<PathBuf>,
    /// Location in the repository the artifact came from.
    pub origin: Option<String>,
    pub size: u64,
    pub error: Option<String>,
}

impl ArtifactDownloadReport {
    pub fn new(artifact: Artifact, status: DownloadStatus) -> Self {
        ArtifactDownloadReport {
            artifact,
            status,
            local_file: None,
            origin: None,
            size: 0,
            error: None,
        }
    }

    pub fn failed(artifact: Artifact, error: impl Into<String>) -> Self {
        ArtifactDownloadReport {
            error: Some(error.into()),
            ..ArtifactDownloadReport::new(artifact, DownloadStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub artifacts: Vec<ArtifactDownloadReport>,
}

impl DownloadReport {
    pub fn add(&mut self, report: ArtifactDownloadReport) {
        self.artifacts.push(report);
    }

    pub fn artifact_report(&self, artifact: &Artifact) -> Option<&ArtifactDownloadReport> {
        self.artifacts.iter().find(|r| &r.artifact == artifact)
    }

    pub fn with_status(&self, status: DownloadStatus) -> impl Iterator<Item = &ArtifactDownloadReport> {
        self.artifacts.iter().filter(move |r| r.status == status)
    }

    pub fn has_failures(&self) -> bool {
        self.with_status(DownloadStatus::Failed).next().is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Point at local origins instead of copying into the cache.
    pub use_origin: bool,
}
