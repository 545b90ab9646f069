//! Transport underneath pattern-based resolvers: where bytes live and how to
//! move them. Locations are `/`-separated strings relative to the repository
//! root.

mod file;

use std::{fmt::Debug, path::Path, path::PathBuf};

use thiserror::Error;

pub use file::FileRepository;

/// Something found at a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub location: String,
    /// Milliseconds since the Unix epoch.
    pub last_modified: u64,
    pub size: u64,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error on {location}: {source}")]
    IO {
        location: String,
        source: std::io::Error,
    },
    #[error("Resource {0} not found")]
    NotFound(String),
    #[error("Resource {0} already exists")]
    AlreadyExists(String),
    #[error("Operation {operation} is not supported by repository {repository}")]
    Unsupported {
        operation: &'static str,
        repository: String,
    },
}

impl TransportError {
    pub fn io(location: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::IO {
            location: location.into(),
            source,
        }
    }
}

pub trait Repository: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// `Ok(None)` when nothing exists at `location`.
    fn resource(&self, location: &str) -> Result<Option<Resource>, TransportError>;

    /// Copies the resource to a local file, creating parent directories.
    fn get(&self, location: &str, destination: &Path) -> Result<(), TransportError>;

    fn read(&self, location: &str) -> Result<Vec<u8>, TransportError>;

    /// Names of the direct children of `parent`; empty when it does not exist.
    fn list(&self, parent: &str) -> Result<Vec<String>, TransportError>;

    fn put(&self, source: &Path, destination: &str, overwrite: bool) -> Result<(), TransportError>;

    fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let _ = (from, to);
        Err(TransportError::Unsupported {
            operation: "rename",
            repository: self.name().to_string(),
        })
    }

    fn delete(&self, location: &str) -> Result<(), TransportError>;

    fn supports_rename(&self) -> bool {
        false
    }

    /// Where the resource lives on the local file system, if it does.
    fn local_path(&self, _location: &str) -> Option<PathBuf> {
        None
    }
}
