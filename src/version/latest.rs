use crate::model::{ModuleDescriptor, ModuleRevisionId, StatusManager};

use super::VersionMatcher;

const PREFIX: &str = "latest.";

/// `latest.<status>`: any revision whose status is at least `<status>`.
#[derive(Debug, Clone, Default)]
pub struct LatestVersionMatcher {
    statuses: StatusManager,
}

impl LatestVersionMatcher {
    pub const NAME: &'static str = "latest";

    pub fn new(statuses: StatusManager) -> Self {
        LatestVersionMatcher { statuses }
    }

    fn required_status<'a>(&self, asked: &'a ModuleRevisionId) -> Option<&'a str> {
        asked.revision().strip_prefix(PREFIX)
    }
}

impl VersionMatcher for LatestVersionMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        self.required_status(asked)
            .is_some_and(|status| !status.is_empty())
    }

    fn accept(&self, _asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
        true
    }

    /// Only the least mature status accepts anything without looking at metadata.
    fn needs_module_descriptor(&self, asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
        match self.required_status(asked) {
            Some(status) => self.statuses.lowest() != Some(status),
            None => false,
        }
    }

    fn accept_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleDescriptor) -> bool {
        match self.required_status(asked) {
            Some(required) => self.statuses.satisfies(&found.status, required),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decides_acceptance() {
        let matcher = LatestVersionMatcher::default();
        let asked = ModuleRevisionId::new("org", "mod", "latest.milestone");
        let mut found = ModuleDescriptor::new(ModuleRevisionId::new("org", "mod", "1.0"));

        assert!(matcher.needs_module_descriptor(&asked, &found.module_revision_id));
        found.status = "integration".to_string();
        assert!(!matcher.accept_descriptor(&asked, &found));
        found.status = "release".to_string();
        assert!(matcher.accept_descriptor(&asked, &found));
    }

    #[test]
    fn latest_integration_accepts_without_metadata() {
        let matcher = LatestVersionMatcher::default();
        let asked = ModuleRevisionId::new("org", "mod", "latest.integration");
        let found = ModuleRevisionId::new("org", "mod", "0.1");
        assert!(!matcher.needs_module_descriptor(&asked, &found));
        assert!(matcher.accept(&asked, &found));
    }
}
