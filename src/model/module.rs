use std::{
    collections::BTreeMap,
    fmt::{Display, Write},
    str::FromStr,
};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::model::ParseError;

/// Identity of a module family: organisation and module name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ModuleId {
    organisation: String,
    name: String,
}

impl ModuleId {
    pub fn new(organisation: impl Into<String>, name: impl Into<String>) -> Self {
        ModuleId {
            organisation: organisation.into(),
            name: name.into(),
        }
    }

    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.organisation, self.name)
    }
}

/// One revision of a module, possibly on a branch, qualified by extra attributes.
///
/// The revision may be a fixed revision or a dynamic constraint such as
/// `latest.integration` or `[1.0,2.0)`; which one it is depends on the active
/// version matchers, not on this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ModuleRevisionId {
    module_id: ModuleId,
    branch: Option<String>,
    revision: String,
    extra: BTreeMap<String, String>,
}

impl ModuleRevisionId {
    pub fn new(
        organisation: impl Into<String>,
        name: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        ModuleRevisionId {
            module_id: ModuleId::new(organisation, name),
            branch: None,
            revision: revision.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn from_module_id(module_id: ModuleId, revision: impl Into<String>) -> Self {
        ModuleRevisionId {
            module_id,
            branch: None,
            revision: revision.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_extra_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_extra_attributes(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    /// Same module, branch and extra attributes, at another revision.
    pub fn with_revision(&self, revision: impl Into<String>) -> Self {
        ModuleRevisionId {
            module_id: self.module_id.clone(),
            branch: self.branch.clone(),
            revision: revision.into(),
            extra: self.extra.clone(),
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn organisation(&self) -> &str {
        self.module_id.organisation()
    }

    pub fn name(&self) -> &str {
        self.module_id.name()
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn extra_attributes(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// Token values used when substituting repository patterns.
    pub fn attributes(&self) -> BTreeMap<&str, &str> {
        let mut attributes: BTreeMap<&str, &str> = self
            .extra
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        attributes.insert("organisation", self.organisation());
        attributes.insert("organization", self.organisation());
        attributes.insert("module", self.name());
        attributes.insert("revision", &self.revision);
        if let Some(branch) = &self.branch {
            attributes.insert("branch", branch);
        }
        attributes
    }
}

impl Display for ModuleRevisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.organisation(), self.name())?;
        if let Some(branch) = &self.branch {
            write!(f, "#{}", branch)?;
        }
        write!(f, ";{}", self.revision)?;
        if !self.extra.is_empty() {
            f.write_char('{')?;
            for (i, (k, v)) in self.extra.iter().enumerate() {
                if i > 0 {
                    f.write_char(',')?;
                }
                write!(f, "{}={}", k, v)?;
            }
            f.write_char('}')?;
        }
        Ok(())
    }
}

impl FromStr for ModuleRevisionId {
    type Err = ParseError;

    /// Parses `org#name;revision` or `org#name#branch;revision`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(
            r"^(?P<organisation>[^#;]+)#(?P<name>[^#;]+)(#(?P<branch>[^#;]+))?;(?P<revision>[^#;{}]+)$",
        )
        .map_err(|_| ParseError::InvalidModuleRevisionId(s.to_string()))?;
        let captures = re
            .captures(s.trim())
            .ok_or_else(|| ParseError::InvalidModuleRevisionId(s.to_string()))?;
        let field = |name: &str| captures.name(name).map(|m| m.as_str().to_string());

        match (field("organisation"), field("name"), field("revision")) {
            (Some(organisation), Some(name), Some(revision)) => {
                Ok(ModuleRevisionId::new(organisation, name, revision).with_branch(field("branch")))
            }
            _ => Err(ParseError::InvalidModuleRevisionId(s.to_string())),
        }
    }
}

impl Serialize for ModuleRevisionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ModuleRevisionIdRepr {
            organisation: self.organisation().to_string(),
            module: self.name().to_string(),
            revision: self.revision.clone(),
            branch: self.branch.clone(),
            extra: self.extra.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModuleRevisionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = ModuleRevisionIdRepr::deserialize(deserializer)?;
        Ok(ModuleRevisionId::new(repr.organisation, repr.module, repr.revision)
            .with_branch(repr.branch)
            .with_extra_attributes(repr.extra))
    }
}

#[derive(Serialize, Deserialize)]
struct ModuleRevisionIdRepr {
    organisation: String,
    module: String,
    revision: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    branch: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    extra: BTreeMap<String, String>,
}
