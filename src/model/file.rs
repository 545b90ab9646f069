use std::{collections::BTreeMap, fmt::Debug, path::Path};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::model::{
    descriptor::{
        format_conf_mapping, parse_conf_mapping, ArtifactRule, Configuration, DeclaredArtifact,
        DependencyDescriptor, ModuleDescriptor, Visibility, ANY_CONFIGURATION,
    },
    module::ModuleRevisionId,
    status::DEFAULT_STATUS,
    ParseError,
};

/// Turns raw metadata bytes fetched from a repository into a descriptor.
pub trait DescriptorParser: Send + Sync + Debug {
    /// `expected` is the coordinate the bytes were fetched for; it fills in
    /// fields the file leaves out.
    fn parse(
        &self,
        expected: &ModuleRevisionId,
        content: &[u8],
    ) -> Result<ModuleDescriptor, ParseError>;

    fn serialize(&self, descriptor: &ModuleDescriptor) -> Result<Vec<u8>, ParseError>;
}

/// The `module.toml` descriptor format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDescriptorParser;

impl DescriptorParser for TomlDescriptorParser {
    fn parse(
        &self,
        expected: &ModuleRevisionId,
        content: &[u8],
    ) -> Result<ModuleDescriptor, ParseError> {
        let text = std::str::from_utf8(content)?;
        let file: DescriptorFile = toml::from_str(text)?;
        file.into_descriptor(Some(expected))
    }

    fn serialize(&self, descriptor: &ModuleDescriptor) -> Result<Vec<u8>, ParseError> {
        Ok(descriptor.to_toml_string()?.into_bytes())
    }
}

impl ModuleDescriptor {
    pub fn from_file(path: &Path) -> Result<ModuleDescriptor, ParseError> {
        debug!("Attempting to read module descriptor from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let descriptor = ModuleDescriptor::from_toml_str(&contents);
        if let Err(err) = &descriptor {
            error!(
                "Could not build a valid descriptor from {} due to err {err}",
                path.display()
            )
        }
        descriptor
    }

    pub fn from_toml_str(data: &str) -> Result<ModuleDescriptor, ParseError> {
        let file: DescriptorFile = toml::from_str(data)?;
        file.into_descriptor(None)
    }

    pub fn to_toml_string(&self) -> Result<String, ParseError> {
        Ok(toml::to_string_pretty(&DescriptorFile::from(self))?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DescriptorFile {
    info: InfoSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    configurations: Vec<ConfigurationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<ArtifactEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InfoSection {
    organisation: String,
    module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publication: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    default: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigurationEntry {
    name: String,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extends: Vec<String>,
    #[serde(default = "enabled")]
    transitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "type", default = "default_artifact_type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ext: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conf: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DependencyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    org: Option<String>,
    name: String,
    rev: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conf: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    force: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    changing: bool,
    #[serde(default = "enabled")]
    transitive: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    include: Vec<ArtifactRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<ArtifactRule>,
}

fn enabled() -> bool {
    true
}

fn default_artifact_type() -> String {
    "jar".to_string()
}

impl DescriptorFile {
    fn into_descriptor(
        self,
        expected: Option<&ModuleRevisionId>,
    ) -> Result<ModuleDescriptor, ParseError> {
        let info = self.info;
        let revision = info
            .revision
            .or_else(|| expected.map(|e| e.revision().to_string()))
            .ok_or_else(|| ParseError::MissingKey("info.revision".to_string()))?;
        let branch = info
            .branch
            .or_else(|| expected.and_then(|e| e.branch().map(str::to_string)));
        let module_revision_id = ModuleRevisionId::new(&info.organisation, &info.module, revision)
            .with_branch(branch)
            .with_extra_attributes(info.extra);

        let mut configurations: Vec<Configuration> = self
            .configurations
            .into_iter()
            .map(|c| Configuration {
                name: c.name,
                visibility: c.visibility,
                extends: c.extends,
                transitive: c.transitive,
                description: c.description,
            })
            .collect();
        if configurations.is_empty() {
            configurations = ModuleDescriptor::new(module_revision_id.clone()).configurations;
        }
        for configuration in &configurations {
            for extended in &configuration.extends {
                if !configurations.iter().any(|c| &c.name == extended) {
                    return Err(ParseError::UnknownConfiguration {
                        conf: extended.clone(),
                        module: module_revision_id.to_string(),
                    });
                }
            }
        }

        let artifacts = self
            .artifacts
            .into_iter()
            .map(|a| DeclaredArtifact {
                name: a.name.unwrap_or_else(|| info.module.clone()),
                ext: a.ext.unwrap_or_else(|| a.kind.clone()),
                kind: a.kind,
                configurations: if a.conf.is_empty() {
                    vec![ANY_CONFIGURATION.to_string()]
                } else {
                    a.conf
                },
                extra: a.extra,
            })
            .collect();

        let dependencies = self
            .dependencies
            .into_iter()
            .map(|d| -> Result<DependencyDescriptor, ParseError> {
                let dependency = ModuleRevisionId::new(
                    d.org.unwrap_or_else(|| info.organisation.clone()),
                    d.name,
                    d.rev,
                )
                .with_branch(d.branch)
                .with_extra_attributes(d.extra);
                let mut dd = DependencyDescriptor::new(module_revision_id.clone(), dependency)
                    .with_force(d.force)
                    .with_changing(d.changing)
                    .with_transitive(d.transitive);
                if let Some(conf) = d.conf {
                    dd.configurations = parse_conf_mapping(&conf)?;
                }
                dd.includes = d.include;
                dd.excludes = d.exclude;
                Ok(dd)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ModuleDescriptor {
            module_revision_id,
            status: info.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            publication: info.publication.unwrap_or(0),
            description: info.description,
            configurations,
            artifacts,
            dependencies,
            default: info.default,
        })
    }
}

impl From<&ModuleDescriptor> for DescriptorFile {
    fn from(md: &ModuleDescriptor) -> Self {
        let mrid = &md.module_revision_id;
        DescriptorFile {
            info: InfoSection {
                organisation: mrid.organisation().to_string(),
                module: mrid.name().to_string(),
                revision: Some(mrid.revision().to_string()),
                branch: mrid.branch().map(str::to_string),
                status: Some(md.status.clone()),
                publication: Some(md.publication),
                description: md.description.clone(),
                default: md.default,
                extra: mrid.extra_attributes().clone(),
            },
            configurations: md
                .configurations
                .iter()
                .map(|c| ConfigurationEntry {
                    name: c.name.clone(),
                    visibility: c.visibility,
                    extends: c.extends.clone(),
                    transitive: c.transitive,
                    description: c.description.clone(),
                })
                .collect(),
            artifacts: md
                .artifacts
                .iter()
                .map(|a| ArtifactEntry {
                    name: Some(a.name.clone()),
                    kind: a.kind.clone(),
                    ext: Some(a.ext.clone()),
                    conf: a.configurations.clone(),
                    extra: a.extra.clone(),
                })
                .collect(),
            dependencies: md
                .dependencies
                .iter()
                .map(|dd| DependencyEntry {
                    org: Some(dd.dependency.organisation().to_string()),
                    name: dd.dependency.name().to_string(),
                    rev: dd.dependency.revision().to_string(),
                    branch: dd.dependency.branch().map(str::to_string),
                    conf: Some(format_conf_mapping(&dd.configurations)),
                    force: dd.force,
                    changing: dd.changing,
                    transitive: dd.transitive,
                    extra: dd.dependency.extra_attributes().clone(),
                    include: dd.includes.clone(),
                    exclude: dd.excludes.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::descriptor::DEFAULT_CONFIGURATION;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_descriptor_with_dependencies() {
        let str = r#"
            [info]
            organisation = "acme"
            module = "app"
            revision = "1.0"
            status = "release"
            publication = 1000

            [[configurations]]
            name = "compile"

            [[configurations]]
            name = "runtime"
            extends = ["compile"]

            [[artifacts]]
            conf = ["runtime"]

            [[dependencies]]
            name = "core"
            rev = "latest.integration"
            conf = "runtime->default"
            changing = true

            [[dependencies]]
            org = "other"
            name = "util"
            rev = "[1.0,2.0)"
            force = true
            exclude = [{ module = "legacy" }]
        "#;
        let md = ModuleDescriptor::from_toml_str(str).unwrap();
        assert_eq!(md.module_revision_id, ModuleRevisionId::new("acme", "app", "1.0"));
        assert_eq!(md.status, "release");
        assert_eq!(md.publication, 1000);
        assert_eq!(md.configuration_names(), vec!["compile", "runtime"]);
        assert_eq!(
            md.artifacts,
            vec![DeclaredArtifact {
                name: "app".to_string(),
                kind: "jar".to_string(),
                ext: "jar".to_string(),
                configurations: vec!["runtime".to_string()],
                extra: BTreeMap::new(),
            }]
        );
        assert_eq!(md.dependencies.len(), 2);
        let core = &md.dependencies[0];
        assert_eq!(
            core.dependency,
            ModuleRevisionId::new("acme", "core", "latest.integration")
        );
        assert!(core.changing);
        assert_eq!(core.dependency_configurations("runtime"), vec!["default"]);
        let util = &md.dependencies[1];
        assert!(util.force);
        assert_eq!(util.dependency.organisation(), "other");
        assert!(util.is_excluded(&crate::model::module::ModuleId::new("other", "legacy")));
    }

    #[test]
    fn missing_configurations_default_to_default() {
        let str = r#"
            [info]
            organisation = "acme"
            module = "lib"
        "#;
        let parsed = TomlDescriptorParser
            .parse(&ModuleRevisionId::new("acme", "lib", "2.1"), str.as_bytes())
            .unwrap();
        assert_eq!(parsed.module_revision_id.revision(), "2.1");
        assert_eq!(parsed.configuration_names(), vec![DEFAULT_CONFIGURATION]);
        ModuleDescriptor::from_toml_str(str).expect_err("revision is required without context");
    }

    #[test]
    fn unknown_extended_configuration_is_rejected() {
        let str = r#"
            [info]
            organisation = "acme"
            module = "lib"
            revision = "1"

            [[configurations]]
            name = "runtime"
            extends = ["compile"]
        "#;
        let err = ModuleDescriptor::from_toml_str(str).unwrap_err();
        assert!(matches!(err, ParseError::UnknownConfiguration { .. }));
    }

    #[test]
    fn write_then_read_keeps_descriptor() {
        let mut md = ModuleDescriptor::new(ModuleRevisionId::new("acme", "app", "3.0"));
        md.status = "milestone".to_string();
        md.publication = 42;
        md.artifacts = vec![DeclaredArtifact::new("app", "jar", "jar")];
        md.dependencies = vec![DependencyDescriptor::new(
            md.module_revision_id.clone(),
            ModuleRevisionId::new("acme", "core", "1.0+"),
        )
        .with_conf_mapping("default->runtime")
        .unwrap()];

        let text = md.to_toml_string().unwrap();
        assert_eq!(ModuleDescriptor::from_toml_str(&text).unwrap(), md);
    }
}
