use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    flock::FileLock,
    model::{Artifact, ModuleDescriptor, ModuleRevisionId, ParseError},
    resolver::{ArtifactDownloadReport, DownloadOptions, DownloadStatus},
};

use super::{
    now_millis, ArtifactOrigin, CacheError, CachedModule, Fetcher, RepositoryCacheManager,
};

const LOCK_FILE: &str = ".lock";
const DESCRIPTOR_FILE: &str = "module.toml";
const ENTRY_FILE: &str = "entry.toml";
const DYNAMIC_FILE: &str = "dynamic.toml";
const ORIGIN_SUFFIX: &str = ".origin.toml";
const PART_SUFFIX: &str = ".part";
const BRANCH_PREFIX: &str = "branch-";

/// The cache on disk:
///
/// ```text
/// <root>/<organisation>/<module>/dynamic.toml
/// <root>/<organisation>/<module>/[<branch>/]<revision>/module.toml
/// <root>/<organisation>/<module>/[<branch>/]<revision>/entry.toml
/// <root>/<organisation>/<module>/[<branch>/]<revision>/<type>s/<artifact>.<ext>
/// <root>/<organisation>/<module>/[<branch>/]<revision>/<type>s/<artifact>.<ext>.origin.toml
/// ```
///
/// The whole directory is locked for as long as the manager lives.
#[derive(Debug)]
pub struct DefaultRepositoryCacheManager {
    root: PathBuf,
    dynamic_ttl: Duration,
    modules: DashMap<ModuleRevisionId, CachedModule>,
    _lock: FileLock,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    resolver: String,
    last_modified: u64,
    last_checked: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DynamicFile {
    /// resolver -> asked revision -> resolution
    #[serde(default)]
    resolved: BTreeMap<String, BTreeMap<String, DynamicEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DynamicEntry {
    revision: String,
    resolved_at: u64,
}

impl DefaultRepositoryCacheManager {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        if root.exists() {
            if !root.is_dir() {
                return Err(CacheError::BadLocation {
                    location: root.display().to_string(),
                });
            }
        } else {
            fs::create_dir_all(&root)?;
        }

        let lock = Self::acquire_lock(&root)?;

        Ok(DefaultRepositoryCacheManager {
            root,
            dynamic_ttl: Duration::ZERO,
            modules: DashMap::new(),
            _lock: lock,
        })
    }

    /// How long a dynamic revision keeps resolving to the same revision
    /// without asking the repository again. Zero always asks.
    pub fn with_dynamic_ttl(mut self, ttl: Duration) -> Self {
        self.dynamic_ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn acquire_lock(location: &Path) -> Result<FileLock, CacheError> {
        let location = location.join(LOCK_FILE);
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location)?;
        info!("Acquired a lock on the cache location");
        Ok(lock)
    }

    fn module_family_dir(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.root.join(mrid.organisation()).join(mrid.name())
    }

    fn module_dir(&self, mrid: &ModuleRevisionId) -> PathBuf {
        let mut dir = self.module_family_dir(mrid);
        if let Some(branch) = mrid.branch() {
            dir.push(format!("{BRANCH_PREFIX}{branch}"));
        }
        dir.push(mrid.revision());
        dir
    }

    /// Extra attributes are part of the file name, so artifacts differing
    /// only by them never share a cache file.
    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        let mut file_name = artifact.name.clone();
        for (key, value) in &artifact.extra {
            file_name.push_str(&format!("-{key}={value}"));
        }
        if !artifact.ext.is_empty() {
            file_name.push('.');
            file_name.push_str(&artifact.ext);
        }
        self.module_dir(&artifact.module_revision_id)
            .join(format!("{}s", artifact.kind))
            .join(file_name)
    }

    fn read_module(&self, mrid: &ModuleRevisionId) -> Result<Option<CachedModule>, CacheError> {
        let dir = self.module_dir(mrid);
        let descriptor_path = dir.join(DESCRIPTOR_FILE);
        let entry_path = dir.join(ENTRY_FILE);
        if !descriptor_path.is_file() || !entry_path.is_file() {
            return Ok(None);
        }
        let entry: EntryFile = read_toml(&entry_path)?;
        let descriptor =
            ModuleDescriptor::from_file(&descriptor_path).map_err(|source| CacheError::Corrupted {
                path: descriptor_path.clone(),
                source,
            })?;
        Ok(Some(CachedModule {
            descriptor: Arc::new(descriptor),
            resolver: entry.resolver,
            last_modified: entry.last_modified,
            last_checked: entry.last_checked,
        }))
    }

    fn write_entry(&self, mrid: &ModuleRevisionId, module: &CachedModule) -> Result<(), CacheError> {
        let entry = EntryFile {
            resolver: module.resolver.clone(),
            last_modified: module.last_modified,
            last_checked: module.last_checked,
        };
        write_atomic(
            &self.module_dir(mrid).join(ENTRY_FILE),
            toml::to_string_pretty(&entry)?.as_bytes(),
        )
    }

    fn read_origin(&self, path: &Path) -> Option<ArtifactOrigin> {
        if !path.is_file() {
            return None;
        }
        match read_toml(path) {
            Ok(origin) => Some(origin),
            Err(err) => {
                warn!("Ignoring unreadable origin {}: {err}", path.display());
                None
            }
        }
    }

    fn fetch_into(
        &self,
        artifact: &Artifact,
        origin: &ArtifactOrigin,
        target: &Path,
        fetch: &Fetcher<'_>,
    ) -> Result<u64, String> {
        let part = append_suffix(target, PART_SUFFIX);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        if let Err(err) = fetch(&part) {
            let _ = fs::remove_file(&part);
            return Err(err.to_string());
        }
        fs::rename(&part, target).map_err(|e| e.to_string())?;
        let stored = ArtifactOrigin {
            local_path: None,
            ..origin.clone()
        };
        self.write_origin(target, &stored).map_err(|e| e.to_string())?;
        debug!("Downloaded {artifact} to {}", target.display());
        Ok(fs::metadata(target).map(|m| m.len()).unwrap_or(0))
    }

    fn write_origin(&self, target: &Path, origin: &ArtifactOrigin) -> Result<(), CacheError> {
        write_atomic(
            &append_suffix(target, ORIGIN_SUFFIX),
            toml::to_string_pretty(origin)?.as_bytes(),
        )
    }
}

impl RepositoryCacheManager for DefaultRepositoryCacheManager {
    fn name(&self) -> &str {
        "default-cache"
    }

    fn find_module(
        &self,
        mrid: &ModuleRevisionId,
        expected_resolver: Option<&str>,
    ) -> Result<Option<CachedModule>, CacheError> {
        let cached = match self.modules.get(mrid) {
            Some(cached) => Some(cached.clone()),
            None => {
                let cached = self.read_module(mrid)?;
                if let Some(cached) = &cached {
                    self.modules.insert(mrid.clone(), cached.clone());
                }
                cached
            }
        };
        Ok(cached.filter(|cached| match expected_resolver {
            Some(expected) if expected != cached.resolver => {
                trace!(
                    "Cached {mrid} comes from {}, not {expected}",
                    cached.resolver
                );
                false
            }
            _ => true,
        }))
    }

    fn store_module(
        &self,
        resolver: &str,
        descriptor: ModuleDescriptor,
        last_modified: u64,
    ) -> Result<CachedModule, CacheError> {
        let mrid = descriptor.module_revision_id.clone();
        let dir = self.module_dir(&mrid);
        let content = descriptor
            .to_toml_string()
            .map_err(|source| CacheError::Corrupted {
                path: dir.join(DESCRIPTOR_FILE),
                source,
            })?;
        write_atomic(&dir.join(DESCRIPTOR_FILE), content.as_bytes())?;
        let cached = CachedModule {
            descriptor: Arc::new(descriptor),
            resolver: resolver.to_string(),
            last_modified,
            last_checked: now_millis(),
        };
        self.write_entry(&mrid, &cached)?;
        debug!("Stored {mrid} from {resolver} in the cache");
        self.modules.insert(mrid, cached.clone());
        Ok(cached)
    }

    fn touch_module(&self, mrid: &ModuleRevisionId) -> Result<(), CacheError> {
        if let Some(mut cached) = self.find_module(mrid, None)? {
            cached.last_checked = now_millis();
            self.write_entry(mrid, &cached)?;
            self.modules.insert(mrid.clone(), cached);
        }
        Ok(())
    }

    fn resolved_revision(
        &self,
        resolver: &str,
        dynamic: &ModuleRevisionId,
    ) -> Result<Option<String>, CacheError> {
        if self.dynamic_ttl.is_zero() {
            return Ok(None);
        }
        let path = self.module_family_dir(dynamic).join(DYNAMIC_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let file: DynamicFile = read_toml(&path)?;
        let entry = file
            .resolved
            .get(resolver)
            .and_then(|entries| entries.get(&dynamic.to_string()));
        Ok(entry
            .filter(|entry| {
                now_millis().saturating_sub(entry.resolved_at) < self.dynamic_ttl.as_millis() as u64
            })
            .map(|entry| entry.revision.clone()))
    }

    fn save_resolved_revision(
        &self,
        resolver: &str,
        dynamic: &ModuleRevisionId,
        revision: &str,
    ) -> Result<(), CacheError> {
        let path = self.module_family_dir(dynamic).join(DYNAMIC_FILE);
        let mut file: DynamicFile = if path.is_file() {
            read_toml(&path)?
        } else {
            DynamicFile::default()
        };
        file.resolved.entry(resolver.to_string()).or_default().insert(
            dynamic.to_string(),
            DynamicEntry {
                revision: revision.to_string(),
                resolved_at: now_millis(),
            },
        );
        write_atomic(&path, toml::to_string_pretty(&file)?.as_bytes())
    }

    fn download(
        &self,
        artifact: &Artifact,
        origin: &ArtifactOrigin,
        fetch: &Fetcher<'_>,
        options: &DownloadOptions,
    ) -> ArtifactDownloadReport {
        let target = self.artifact_path(artifact);
        let origin_local = origin.local_path.as_ref().filter(|p| p.is_file());
        let mut report = ArtifactDownloadReport::new(artifact.clone(), DownloadStatus::No);
        report.origin = Some(origin.location.clone());

        if let Some(previous) = self.read_origin(&append_suffix(&target, ORIGIN_SUFFIX)) {
            let unchanged = previous.location == origin.location
                && previous.last_modified >= origin.last_modified;
            let reusable = match &previous.local_path {
                Some(local) => options.use_origin && local.is_file(),
                None => target.is_file(),
            };
            if unchanged && reusable {
                let local = previous.local_path.unwrap_or_else(|| target.clone());
                debug!("{artifact} is up to date in the cache");
                report.size = fs::metadata(&local).map(|m| m.len()).unwrap_or(0);
                report.local_file = Some(local);
                return report;
            }
        }

        if options.use_origin {
            if let Some(local) = origin_local {
                if let Err(err) = self.write_origin(&target, origin) {
                    return ArtifactDownloadReport::failed(artifact.clone(), err.to_string());
                }
                let _ = fs::remove_file(&target);
                debug!("Using {artifact} from its origin {}", local.display());
                report.size = fs::metadata(local).map(|m| m.len()).unwrap_or(0);
                report.local_file = Some(local.clone());
                return report;
            }
        }

        match self.fetch_into(artifact, origin, &target, fetch) {
            Ok(size) => {
                report.status = DownloadStatus::Successful;
                report.size = size;
                report.local_file = Some(target);
                report
            }
            Err(err) => {
                warn!("Failed to download {artifact}: {err}");
                ArtifactDownloadReport {
                    origin: Some(origin.location.clone()),
                    ..ArtifactDownloadReport::failed(artifact.clone(), err)
                }
            }
        }
    }

    fn cached_artifact(&self, artifact: &Artifact) -> Option<PathBuf> {
        let target = self.artifact_path(artifact);
        match self.read_origin(&append_suffix(&target, ORIGIN_SUFFIX)) {
            Some(ArtifactOrigin {
                local_path: Some(local),
                ..
            }) => local.is_file().then_some(local),
            _ => target.is_file().then_some(target),
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        info!("Clearing repository cache {}.", self.root.display());
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_name() == LOCK_FILE {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        self.modules.clear();
        Ok(())
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CacheError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| CacheError::Corrupted {
        path: path.to_path_buf(),
        source: ParseError::Toml(e),
    })
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let part = append_suffix(path, PART_SUFFIX);
    fs::write(&part, content)?;
    fs::rename(&part, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{cache::CachePolicy, repository::TransportError};

    fn cache(dir: &Path) -> DefaultRepositoryCacheManager {
        DefaultRepositoryCacheManager::new(dir.join("cache")).unwrap()
    }

    fn origin(location: &str, last_modified: u64) -> ArtifactOrigin {
        ArtifactOrigin {
            resolver: "local".to_string(),
            location: location.to_string(),
            last_modified,
            local_path: None,
        }
    }

    #[test]
    fn store_and_find_module() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let mrid = ModuleRevisionId::new("org", "mod", "1.0");
        let mut descriptor = ModuleDescriptor::new(mrid.clone());
        descriptor.publication = 42;

        assert!(cache.find_module(&mrid, None).unwrap().is_none());
        cache.store_module("local", descriptor.clone(), 7).unwrap();

        let reopened = {
            drop(cache);
            super::DefaultRepositoryCacheManager::new(dir.path().join("cache")).unwrap()
        };
        let cached = reopened.find_module(&mrid, None).unwrap().unwrap();
        assert_eq!(*cached.descriptor, descriptor);
        assert_eq!(cached.last_modified, 7);
        assert_eq!(cached.resolver, "local");
        assert!(reopened.find_module(&mrid, Some("remote")).unwrap().is_none());

        let policy = CachePolicy::default();
        assert!(reopened.get_if_fresh(&mrid, &policy, None).unwrap().is_some());
        let policy = CachePolicy {
            check_modified: true,
            ..policy
        };
        assert!(reopened.get_if_fresh(&mrid, &policy, None).unwrap().is_none());
    }

    #[test]
    fn download_once_per_origin() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let artifact = Artifact::new(ModuleRevisionId::new("org", "mod", "1.0"), "mod", "jar", "jar");
        let calls = Cell::new(0);
        let fetch = |path: &Path| {
            calls.set(calls.get() + 1);
            fs::write(path, b"jar").map_err(|e| TransportError::io("mod.jar", e))
        };
        let options = DownloadOptions::default();

        let first = cache.download(&artifact, &origin("org/mod.jar", 10), &fetch, &options);
        assert_eq!(first.status, DownloadStatus::Successful);
        assert_eq!(first.size, 3);
        let second = cache.download(&artifact, &origin("org/mod.jar", 10), &fetch, &options);
        assert_eq!(second.status, DownloadStatus::No);
        assert_eq!(calls.get(), 1);

        let updated = cache.download(&artifact, &origin("org/mod.jar", 20), &fetch, &options);
        assert_eq!(updated.status, DownloadStatus::Successful);
        assert_eq!(calls.get(), 2);
        assert_eq!(
            cache.cached_artifact(&artifact),
            Some(cache.artifact_path(&artifact))
        );
    }

    #[test]
    fn extra_attributes_get_their_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let classified = |classifier: &str| {
            let mut artifact =
                Artifact::new(ModuleRevisionId::new("org", "mod", "1.0"), "mod", "jar", "jar");
            artifact.extra.insert("classifier".to_string(), classifier.to_string());
            artifact
        };
        let linux = classified("linux");
        let windows = classified("windows");
        let fetch_bytes = |content: &'static str| {
            move |path: &Path| fs::write(path, content).map_err(|e| TransportError::io("mod.jar", e))
        };
        let options = DownloadOptions::default();

        let first = cache.download(&linux, &origin("linux/mod.jar", 10), &fetch_bytes("LINUX"), &options);
        let second =
            cache.download(&windows, &origin("windows/mod.jar", 10), &fetch_bytes("WINDOWS"), &options);
        assert_eq!(first.status, DownloadStatus::Successful);
        assert_eq!(second.status, DownloadStatus::Successful);
        assert_ne!(first.local_file, second.local_file);
        assert!(cache
            .artifact_path(&linux)
            .ends_with("jars/mod-classifier=linux.jar"));
        assert_eq!(
            fs::read_to_string(first.local_file.unwrap()).unwrap(),
            "LINUX"
        );

        let again = cache.download(&linux, &origin("linux/mod.jar", 10), &fetch_bytes("LINUX"), &options);
        assert_eq!(again.status, DownloadStatus::No);
    }

    #[test]
    fn branches_do_not_overlap_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let plain = ModuleRevisionId::new("org", "mod", "1.0");
        let branched =
            ModuleRevisionId::new("org", "mod", "x").with_branch(Some("1.0".to_string()));

        let branched_dir = cache.module_dir(&branched);
        assert!(!branched_dir.starts_with(cache.module_dir(&plain)));
        assert_eq!(branched_dir, dir.path().join("cache/org/mod/branch-1.0/x"));
    }

    #[test]
    fn failed_fetch_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let artifact = Artifact::new(ModuleRevisionId::new("org", "mod", "1.0"), "mod", "jar", "jar");
        let fetch = |_: &Path| -> Result<(), TransportError> {
            Err(TransportError::NotFound("org/mod.jar".to_string()))
        };

        let report = cache.download(
            &artifact,
            &origin("org/mod.jar", 10),
            &fetch,
            &DownloadOptions::default(),
        );
        assert_eq!(report.status, DownloadStatus::Failed);
        assert!(report.error.is_some());
        assert_eq!(cache.cached_artifact(&artifact), None);
    }

    #[test]
    fn use_origin_points_at_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let local = dir.path().join("mod.jar");
        fs::write(&local, b"jar").unwrap();
        let artifact = Artifact::new(ModuleRevisionId::new("org", "mod", "1.0"), "mod", "jar", "jar");
        let origin = ArtifactOrigin {
            local_path: Some(local.clone()),
            ..origin("org/mod.jar", 10)
        };
        let fetch = |_: &Path| -> Result<(), TransportError> { panic!("must not fetch") };

        let report = cache.download(
            &artifact,
            &origin,
            &fetch,
            &DownloadOptions { use_origin: true },
        );
        assert_eq!(report.status, DownloadStatus::No);
        assert_eq!(report.local_file, Some(local.clone()));
        assert_eq!(cache.cached_artifact(&artifact), Some(local));
        assert!(!cache.artifact_path(&artifact).exists());
    }

    #[test]
    fn dynamic_revisions_honor_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let asked = ModuleRevisionId::new("org", "mod", "latest.integration");

        let cache = cache(dir.path());
        cache.save_resolved_revision("local", &asked, "2.0").unwrap();
        assert_eq!(cache.resolved_revision("local", &asked).unwrap(), None);
        drop(cache);

        let cache = DefaultRepositoryCacheManager::new(dir.path().join("cache"))
            .unwrap()
            .with_dynamic_ttl(Duration::from_secs(3600));
        assert_eq!(
            cache.resolved_revision("local", &asked).unwrap(),
            Some("2.0".to_string())
        );
        assert_eq!(cache.resolved_revision("other", &asked).unwrap(), None);
    }

    #[test]
    fn clear_keeps_lock() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let mrid = ModuleRevisionId::new("org", "mod", "1.0");
        cache
            .store_module("local", ModuleDescriptor::new(mrid.clone()), 0)
            .unwrap();
        cache.clear().unwrap();
        assert!(cache.find_module(&mrid, None).unwrap().is_none());
        assert!(cache.root().join(LOCK_FILE).exists());
    }
}
