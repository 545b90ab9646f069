use std::str::Utf8Error;

use thiserror::Error;

pub mod descriptor;
pub mod file;
pub mod module;
pub mod status;

pub use descriptor::{
    Artifact, ArtifactRule, Configuration, DeclaredArtifact, DependencyDescriptor,
    ModuleDescriptor, Visibility,
};
pub use module::{ModuleId, ModuleRevisionId};
pub use status::StatusManager;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading descriptor: {0}")]
    IO(#[from] std::io::Error),
    #[error("Descriptor is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Missing TOML key `{0}` while parsing")]
    MissingKey(String),
    #[error("Invalid configuration mapping `{0}`")]
    InvalidConfMapping(String),
    #[error("Invalid module revision id `{0}`, expected `organisation#module;revision`")]
    InvalidModuleRevisionId(String),
    #[error("Configuration `{conf}` does not exist in {module}")]
    UnknownConfiguration { conf: String, module: String },
}
