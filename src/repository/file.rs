use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use log::trace;

use super::{Repository, Resource, TransportError};

/// A repository rooted in a local directory.
#[derive(Debug, Clone)]
pub struct FileRepository {
    name: String,
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        FileRepository {
            name: format!("file:{}", root.display()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, location: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(location.split('/').filter(|s| !s.is_empty()));
        path
    }
}

fn modified_millis(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn create_parent(path: &Path, location: &str) -> Result<(), TransportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransportError::io(location, e))?;
    }
    Ok(())
}

impl Repository for FileRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource(&self, location: &str) -> Result<Option<Resource>, TransportError> {
        let path = self.path(location);
        trace!("Probing {}", path.display());
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(Resource {
                location: location.to_string(),
                last_modified: modified_millis(&metadata),
                size: metadata.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::io(location, e)),
        }
    }

    fn get(&self, location: &str, destination: &Path) -> Result<(), TransportError> {
        let source = self.path(location);
        if !source.is_file() {
            return Err(TransportError::NotFound(location.to_string()));
        }
        create_parent(destination, location)?;
        fs::copy(&source, destination).map_err(|e| TransportError::io(location, e))?;
        Ok(())
    }

    fn read(&self, location: &str) -> Result<Vec<u8>, TransportError> {
        fs::read(self.path(location)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::NotFound(location.to_string()),
            _ => TransportError::io(location, e),
        })
    }

    fn list(&self, parent: &str) -> Result<Vec<String>, TransportError> {
        let path = self.path(parent);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(TransportError::io(parent, e)),
        };
        let mut names = vec![];
        for entry in entries {
            let entry = entry.map_err(|e| TransportError::io(parent, e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn put(&self, source: &Path, destination: &str, overwrite: bool) -> Result<(), TransportError> {
        let target = self.path(destination);
        if !overwrite && target.exists() {
            return Err(TransportError::AlreadyExists(destination.to_string()));
        }
        create_parent(&target, destination)?;
        fs::copy(source, &target).map_err(|e| TransportError::io(destination, e))?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let target = self.path(to);
        create_parent(&target, to)?;
        fs::rename(self.path(from), &target).map_err(|e| TransportError::io(from, e))
    }

    fn delete(&self, location: &str) -> Result<(), TransportError> {
        let path = self.path(location);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransportError::io(location, e)),
        }
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn local_path(&self, location: &str) -> Option<PathBuf> {
        Some(self.path(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn put_list_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileRepository::new(dir.path());
        let source = dir.path().join("source.jar");
        fs::write(&source, b"bytes").unwrap();

        assert_eq!(repository.resource("org/mod/1.0/mod.jar").unwrap(), None);
        repository
            .put(&source, "org/mod/1.0/mod.jar", false)
            .unwrap();
        let resource = repository.resource("org/mod/1.0/mod.jar").unwrap().unwrap();
        assert_eq!(resource.size, 5);
        assert_eq!(repository.list("org/mod").unwrap(), vec!["1.0".to_string()]);
        assert_eq!(repository.list("missing").unwrap(), Vec::<String>::new());
        assert!(matches!(
            repository.put(&source, "org/mod/1.0/mod.jar", false),
            Err(TransportError::AlreadyExists(_))
        ));
        assert_eq!(repository.read("org/mod/1.0/mod.jar").unwrap(), b"bytes");
    }

    #[test]
    fn rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileRepository::new(dir.path());
        let source = dir.path().join("source.jar");
        fs::write(&source, b"bytes").unwrap();
        repository.put(&source, "staging/a.jar", false).unwrap();

        repository.rename("staging/a.jar", "final/a.jar").unwrap();
        assert!(repository.resource("staging/a.jar").unwrap().is_none());
        assert!(repository.resource("final/a.jar").unwrap().is_some());

        repository.delete("final").unwrap();
        assert!(repository.resource("final/a.jar").unwrap().is_none());
        repository.delete("final").unwrap();
    }
}
