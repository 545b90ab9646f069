//! Persistent store of resolved descriptors and downloaded artifacts.
//!
//! A cached descriptor for a fixed revision is trusted as is unless
//! check-modified is requested or the dependency is changing; anything else
//! must be revalidated by the resolver that produced it.

mod disk;

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    latest::ArtifactInfo,
    model::{Artifact, ModuleDescriptor, ModuleRevisionId, ParseError},
    repository::TransportError,
    resolver::{ArtifactDownloadReport, DownloadOptions},
};

pub use disk::DefaultRepositoryCacheManager;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Corrupted cache entry {path}: {source}")]
    Corrupted {
        path: PathBuf,
        source: ParseError,
    },
    #[error("Could not write cache entry: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A descriptor found in the cache, with what is known about its source.
#[derive(Debug, Clone)]
pub struct CachedModule {
    pub descriptor: Arc<ModuleDescriptor>,
    /// Name of the resolver that stored it.
    pub resolver: String,
    /// Modification time of the descriptor in its repository.
    pub last_modified: u64,
    /// When the repository was last asked about it.
    pub last_checked: u64,
}

impl ArtifactInfo for CachedModule {
    fn revision(&self) -> &str {
        self.descriptor.module_revision_id.revision()
    }

    fn last_modified(&self) -> u64 {
        self.descriptor.publication
    }

    fn status(&self) -> Option<&str> {
        Some(&self.descriptor.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Use the cached entry without asking the repository.
    Trusted,
    /// Ask the repository; reuse the entry if it was not modified.
    Revalidate,
}

/// What a lookup needs to decide whether a cache entry can be trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub dynamic: bool,
    pub check_modified: bool,
    pub changing: bool,
}

impl CachePolicy {
    pub fn freshness(&self) -> Freshness {
        if self.dynamic || self.check_modified || self.changing {
            Freshness::Revalidate
        } else {
            Freshness::Trusted
        }
    }
}

/// Where an artifact comes from in its repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOrigin {
    pub resolver: String,
    pub location: String,
    pub last_modified: u64,
    /// Set when the origin is readable in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

pub type Fetcher<'a> = dyn Fn(&Path) -> Result<(), TransportError> + 'a;

pub trait RepositoryCacheManager: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Cached descriptor of a fixed revision, regardless of freshness. With
    /// `expected_resolver`, entries stored by another resolver are ignored.
    fn find_module(
        &self,
        mrid: &ModuleRevisionId,
        expected_resolver: Option<&str>,
    ) -> Result<Option<CachedModule>, CacheError>;

    /// Cached descriptor only when the policy allows trusting it without
    /// asking the repository.
    fn get_if_fresh(
        &self,
        mrid: &ModuleRevisionId,
        policy: &CachePolicy,
        expected_resolver: Option<&str>,
    ) -> Result<Option<CachedModule>, CacheError> {
        match policy.freshness() {
            Freshness::Trusted => self.find_module(mrid, expected_resolver),
            Freshness::Revalidate => Ok(None),
        }
    }

    fn store_module(
        &self,
        resolver: &str,
        descriptor: ModuleDescriptor,
        last_modified: u64,
    ) -> Result<CachedModule, CacheError>;

    /// Records that the repository confirmed the cached entry is current.
    fn touch_module(&self, mrid: &ModuleRevisionId) -> Result<(), CacheError>;

    /// Revision a dynamic constraint recently resolved to, while still
    /// within the time to live.
    fn resolved_revision(
        &self,
        resolver: &str,
        dynamic: &ModuleRevisionId,
    ) -> Result<Option<String>, CacheError>;

    fn save_resolved_revision(
        &self,
        resolver: &str,
        dynamic: &ModuleRevisionId,
        revision: &str,
    ) -> Result<(), CacheError>;

    /// Brings an artifact into the cache unless the cached copy already
    /// comes from the same origin and is not older. Never fails: problems
    /// are reported as a failed download.
    fn download(
        &self,
        artifact: &Artifact,
        origin: &ArtifactOrigin,
        fetch: &Fetcher<'_>,
        options: &DownloadOptions,
    ) -> ArtifactDownloadReport;

    /// Local file holding the artifact bytes, if it was downloaded.
    fn cached_artifact(&self, artifact: &Artifact) -> Option<PathBuf>;

    fn clear(&self) -> Result<(), CacheError>;
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_policy() {
        let fixed = CachePolicy::default();
        assert_eq!(fixed.freshness(), Freshness::Trusted);
        for policy in [
            CachePolicy {
                dynamic: true,
                ..fixed
            },
            CachePolicy {
                check_modified: true,
                ..fixed
            },
            CachePolicy {
                changing: true,
                ..fixed
            },
        ] {
            assert_eq!(policy.freshness(), Freshness::Revalidate);
        }
    }
}
