use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{
    module::{ModuleId, ModuleRevisionId},
    status::DEFAULT_STATUS,
    ParseError,
};

pub const DEFAULT_CONFIGURATION: &str = "default";
pub const ANY_CONFIGURATION: &str = "*";
pub const SAME_CONFIGURATION: &str = "@";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "private")]
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Configuration {
    pub name: String,
    pub visibility: Visibility,
    pub extends: Vec<String>,
    pub transitive: bool,
    pub description: Option<String>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Configuration {
            name: name.into(),
            visibility: Visibility::Public,
            extends: vec![],
            transitive: true,
            description: None,
        }
    }

    pub fn extending<I, S>(mut self, extends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extends = extends.into_iter().map(Into::into).collect();
        self
    }
}

/// A published file of a module revision.
///
/// Identity is structural over every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Artifact {
    pub module_revision_id: ModuleRevisionId,
    pub name: String,
    pub kind: String,
    pub ext: String,
    pub publication: u64,
    pub extra: BTreeMap<String, String>,
}

pub const METADATA_ARTIFACT_NAME: &str = "module";
pub const METADATA_ARTIFACT_TYPE: &str = "module";
pub const METADATA_ARTIFACT_EXT: &str = "toml";

impl Artifact {
    pub fn new(
        module_revision_id: ModuleRevisionId,
        name: impl Into<String>,
        kind: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Artifact {
            module_revision_id,
            name: name.into(),
            kind: kind.into(),
            ext: ext.into(),
            publication: 0,
            extra: BTreeMap::new(),
        }
    }

    /// The module descriptor file itself, seen as an artifact.
    pub fn metadata(module_revision_id: ModuleRevisionId) -> Self {
        Artifact::new(
            module_revision_id,
            METADATA_ARTIFACT_NAME,
            METADATA_ARTIFACT_TYPE,
            METADATA_ARTIFACT_EXT,
        )
    }

    pub fn is_metadata(&self) -> bool {
        self.kind == METADATA_ARTIFACT_TYPE
    }

    pub fn with_publication(mut self, publication: u64) -> Self {
        self.publication = publication;
        self
    }

    pub fn attributes(&self) -> BTreeMap<&str, &str> {
        let mut attributes = self.module_revision_id.attributes();
        for (k, v) in &self.extra {
            attributes.insert(k, v);
        }
        attributes.insert("artifact", &self.name);
        attributes.insert("type", &self.kind);
        attributes.insert("ext", &self.ext);
        attributes
    }

    pub fn file_name(&self) -> String {
        if self.ext.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.ext)
        }
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}!{}.{}({})",
            self.module_revision_id, self.name, self.ext, self.kind
        )
    }
}

/// An artifact as declared in a descriptor, with the configurations it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredArtifact {
    pub name: String,
    pub kind: String,
    pub ext: String,
    pub configurations: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

impl DeclaredArtifact {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, ext: impl Into<String>) -> Self {
        DeclaredArtifact {
            name: name.into(),
            kind: kind.into(),
            ext: ext.into(),
            configurations: vec![ANY_CONFIGURATION.to_string()],
            extra: BTreeMap::new(),
        }
    }

    fn belongs_to(&self, confs: &[String]) -> bool {
        self.configurations
            .iter()
            .any(|c| c == ANY_CONFIGURATION || confs.contains(c))
    }
}

/// Include or exclude rule attached to a dependency edge. Every field is a
/// glob where `*` matches any sequence of characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRule {
    #[serde(default = "any")]
    pub organisation: String,
    #[serde(default = "any")]
    pub module: String,
    #[serde(default = "any")]
    pub artifact: String,
    #[serde(rename = "type", default = "any")]
    pub kind: String,
    #[serde(default = "any")]
    pub ext: String,
}

fn any() -> String {
    ANY_CONFIGURATION.to_string()
}

impl ArtifactRule {
    pub fn module(organisation: impl Into<String>, module: impl Into<String>) -> Self {
        ArtifactRule {
            organisation: organisation.into(),
            module: module.into(),
            artifact: any(),
            kind: any(),
            ext: any(),
        }
    }

    /// A rule that does not restrict artifact name, type or extension excludes
    /// the whole module, including its transitive dependencies.
    pub fn is_module_wide(&self) -> bool {
        self.artifact == ANY_CONFIGURATION
            && self.kind == ANY_CONFIGURATION
            && self.ext == ANY_CONFIGURATION
    }

    pub fn matches_module(&self, module_id: &ModuleId) -> bool {
        glob_matches(&self.organisation, module_id.organisation())
            && glob_matches(&self.module, module_id.name())
    }

    pub fn matches_artifact(&self, artifact: &Artifact) -> bool {
        self.matches_module(artifact.module_revision_id.module_id())
            && glob_matches(&self.artifact, &artifact.name)
            && glob_matches(&self.kind, &artifact.kind)
            && glob_matches(&self.ext, &artifact.ext)
    }
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    if pattern == ANY_CONFIGURATION {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == value;
    }
    let expression = pattern
        .split('*')
        .map(regex_lite::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", expression))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// A declared dependency edge from `parent` to the `dependency` constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    pub parent: ModuleRevisionId,
    pub dependency: ModuleRevisionId,
    /// Source configuration to target configurations.
    pub configurations: BTreeMap<String, Vec<String>>,
    pub includes: Vec<ArtifactRule>,
    pub excludes: Vec<ArtifactRule>,
    pub force: bool,
    pub changing: bool,
    pub transitive: bool,
}

impl DependencyDescriptor {
    pub fn new(parent: ModuleRevisionId, dependency: ModuleRevisionId) -> Self {
        DependencyDescriptor {
            parent,
            dependency,
            configurations: BTreeMap::from([(
                ANY_CONFIGURATION.to_string(),
                vec![ANY_CONFIGURATION.to_string()],
            )]),
            includes: vec![],
            excludes: vec![],
            force: false,
            changing: false,
            transitive: true,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_changing(mut self, changing: bool) -> Self {
        self.changing = changing;
        self
    }

    pub fn with_transitive(mut self, transitive: bool) -> Self {
        self.transitive = transitive;
        self
    }

    pub fn with_conf_mapping(mut self, mapping: &str) -> Result<Self, ParseError> {
        self.configurations = parse_conf_mapping(mapping)?;
        Ok(self)
    }

    pub fn with_exclude(mut self, rule: ArtifactRule) -> Self {
        self.excludes.push(rule);
        self
    }

    /// Same edge pointing at another revision of the dependency.
    pub fn with_dependency_revision(&self, revision: &str) -> Self {
        DependencyDescriptor {
            dependency: self.dependency.with_revision(revision),
            ..self.clone()
        }
    }

    pub fn module_configurations(&self) -> impl Iterator<Item = &str> {
        self.configurations.keys().map(String::as_str)
    }

    /// Target configurations requested when the parent is resolved in `module_conf`.
    pub fn dependency_configurations(&self, module_conf: &str) -> Vec<String> {
        let mut targets = BTreeSet::new();
        for key in [module_conf, ANY_CONFIGURATION] {
            if let Some(confs) = self.configurations.get(key) {
                for conf in confs {
                    if conf == SAME_CONFIGURATION {
                        targets.insert(module_conf.to_string());
                    } else {
                        targets.insert(conf.clone());
                    }
                }
            }
        }
        targets.into_iter().collect()
    }

    pub fn is_excluded(&self, module_id: &ModuleId) -> bool {
        self.excludes
            .iter()
            .any(|rule| rule.is_module_wide() && rule.matches_module(module_id))
    }

    pub fn accepts_artifact(&self, artifact: &Artifact) -> bool {
        let included = self.includes.is_empty()
            || self.includes.iter().any(|rule| rule.matches_artifact(artifact));
        let excluded = self
            .excludes
            .iter()
            .any(|rule| !rule.is_module_wide() && rule.matches_artifact(artifact));
        included && !excluded
    }
}

impl Display for DependencyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dependency: {} {{{}}}",
            self.dependency,
            format_conf_mapping(&self.configurations)
        )
    }
}

/// Parses `compile,runtime->default;test->*` style configuration mappings.
/// A side without `->` maps the configuration to itself.
pub fn parse_conf_mapping(mapping: &str) -> Result<BTreeMap<String, Vec<String>>, ParseError> {
    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for group in mapping.split(';').map(str::trim).filter(|g| !g.is_empty()) {
        let (sources, targets) = match group.split_once("->") {
            Some((sources, targets)) => (sources, Some(targets)),
            None => (group, None),
        };
        let split = |s: &str| {
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        let sources = split(sources);
        if sources.is_empty() {
            return Err(ParseError::InvalidConfMapping(mapping.to_string()));
        }
        for source in sources {
            let targets = match targets {
                Some(targets) => split(targets),
                None => vec![source.clone()],
            };
            if targets.is_empty() {
                return Err(ParseError::InvalidConfMapping(mapping.to_string()));
            }
            let entry = result.entry(source).or_default();
            for target in targets {
                if !entry.contains(&target) {
                    entry.push(target);
                }
            }
        }
    }
    if result.is_empty() {
        return Err(ParseError::InvalidConfMapping(mapping.to_string()));
    }
    Ok(result)
}

pub fn format_conf_mapping(mapping: &BTreeMap<String, Vec<String>>) -> String {
    mapping
        .iter()
        .map(|(source, targets)| format!("{}->{}", source, targets.join(",")))
        .collect::<Vec<_>>()
        .join(";")
}

/// Full metadata of one module revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub module_revision_id: ModuleRevisionId,
    pub status: String,
    /// Milliseconds since the Unix epoch.
    pub publication: u64,
    pub description: Option<String>,
    pub configurations: Vec<Configuration>,
    pub artifacts: Vec<DeclaredArtifact>,
    pub dependencies: Vec<DependencyDescriptor>,
    /// Synthesized because no metadata was found, only artifacts.
    pub default: bool,
}

impl ModuleDescriptor {
    pub fn new(module_revision_id: ModuleRevisionId) -> Self {
        ModuleDescriptor {
            module_revision_id,
            status: DEFAULT_STATUS.to_string(),
            publication: 0,
            description: None,
            configurations: vec![Configuration::new(DEFAULT_CONFIGURATION)],
            artifacts: vec![],
            dependencies: vec![],
            default: false,
        }
    }

    /// Placeholder descriptor for a module published without metadata: one
    /// `default` configuration holding one artifact named after the module.
    pub fn synthesize_default(
        module_revision_id: ModuleRevisionId,
        publication: u64,
        kind: &str,
        ext: &str,
    ) -> Self {
        let artifact = DeclaredArtifact::new(module_revision_id.name(), kind, ext);
        ModuleDescriptor {
            publication,
            artifacts: vec![artifact],
            default: true,
            ..ModuleDescriptor::new(module_revision_id)
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        self.module_revision_id.module_id()
    }

    pub fn configuration(&self, name: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    pub fn configuration_names(&self) -> Vec<&str> {
        self.configurations.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn public_configurations(&self) -> Vec<&str> {
        self.configurations
            .iter()
            .filter(|c| c.visibility == Visibility::Public)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// The configuration and everything it extends, transitively.
    pub fn expand_configuration(&self, name: &str) -> Result<Vec<String>, ParseError> {
        let mut expanded: Vec<String> = vec![];
        let mut pending = vec![name.to_string()];
        while let Some(conf) = pending.pop() {
            if expanded.contains(&conf) {
                continue;
            }
            let configuration =
                self.configuration(&conf)
                    .ok_or_else(|| ParseError::UnknownConfiguration {
                        conf: conf.clone(),
                        module: self.module_revision_id.to_string(),
                    })?;
            pending.extend(configuration.extends.iter().cloned());
            expanded.push(conf);
        }
        Ok(expanded)
    }

    /// Concrete artifacts published in the given configuration.
    pub fn artifacts_for(&self, conf: &str) -> Result<Vec<Artifact>, ParseError> {
        let confs = self.expand_configuration(conf)?;
        Ok(self
            .artifacts
            .iter()
            .filter(|a| a.belongs_to(&confs))
            .map(|a| Artifact {
                module_revision_id: self.module_revision_id.clone(),
                name: a.name.clone(),
                kind: a.kind.clone(),
                ext: a.ext.clone(),
                publication: self.publication,
                extra: a.extra.clone(),
            })
            .collect())
    }

    /// Dependencies needed by the given configuration, each with the target
    /// configurations it requests.
    pub fn dependencies_for(
        &self,
        conf: &str,
    ) -> Result<Vec<(&DependencyDescriptor, Vec<String>)>, ParseError> {
        let confs = self.expand_configuration(conf)?;
        Ok(self
            .dependencies
            .iter()
            .filter_map(|dd| {
                let targets: BTreeSet<String> = confs
                    .iter()
                    .flat_map(|c| dd.dependency_configurations(c))
                    .collect();
                (!targets.is_empty()).then(|| (dd, targets.into_iter().collect()))
            })
            .collect())
    }

    /// Target configurations as they exist on this module: `*` selects all
    /// public configurations, and a default descriptor maps anything to
    /// `default`.
    pub fn select_configurations(&self, requested: &[String]) -> Vec<String> {
        let mut selected = BTreeSet::new();
        for conf in requested {
            if conf == ANY_CONFIGURATION {
                selected.extend(self.public_configurations().into_iter().map(str::to_string));
            } else if self.default && self.configuration(conf).is_none() {
                selected.insert(DEFAULT_CONFIGURATION.to_string());
            } else {
                selected.insert(conf.clone());
            }
        }
        selected.into_iter().collect()
    }
}
