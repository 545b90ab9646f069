use crate::model::ModuleRevisionId;

use super::VersionMatcher;

/// `1.0+`: any revision starting with `1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubVersionMatcher;

impl SubVersionMatcher {
    pub const NAME: &'static str = "sub-revision";
}

impl VersionMatcher for SubVersionMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        asked.revision().ends_with('+')
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        match asked.revision().strip_suffix('+') {
            Some(prefix) => found.revision().starts_with(prefix),
            None => false,
        }
    }
}
