//! Classification of requested revisions as fixed or dynamic, and acceptance
//! of concrete revisions against dynamic constraints.

mod latest;
mod range;
mod snapshot;
mod sub;

use std::{cmp::Ordering, fmt::Debug, sync::Arc};

use crate::{
    latest::LatestRevisionStrategy,
    model::{ModuleDescriptor, ModuleRevisionId, StatusManager},
};

pub use latest::LatestVersionMatcher;
pub use range::VersionRangeMatcher;
pub use snapshot::MavenTimedSnapshotVersionMatcher;
pub use sub::SubVersionMatcher;

pub trait VersionMatcher: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool;

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool;

    /// Whether accepting `found` requires its descriptor, in which case
    /// [`VersionMatcher::accept_descriptor`] has the final word.
    fn needs_module_descriptor(&self, _asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
        false
    }

    fn accept_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleDescriptor) -> bool {
        self.accept(asked, &found.module_revision_id)
    }

    /// Orders two found revisions with respect to the `asked` constraint:
    /// an accepted revision is better than a rejected one, two accepted ones
    /// compare by revision. `None` when neither is accepted.
    fn compare(
        &self,
        asked: &ModuleRevisionId,
        a: &ModuleRevisionId,
        b: &ModuleRevisionId,
    ) -> Option<Ordering> {
        match (self.accept(asked, a), self.accept(asked, b)) {
            (true, true) => {
                Some(LatestRevisionStrategy::default().compare_revisions(a.revision(), b.revision()))
            }
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

/// Matches revisions exactly. Never dynamic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactVersionMatcher;

impl ExactVersionMatcher {
    pub const NAME: &'static str = "exact";
}

impl VersionMatcher for ExactVersionMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_dynamic(&self, _asked: &ModuleRevisionId) -> bool {
        false
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        asked.revision() == found.revision()
    }
}

/// Delegates to the first matcher that considers the asked revision dynamic;
/// a revision no matcher recognizes is fixed and matched exactly.
#[derive(Debug, Clone)]
pub struct ChainVersionMatcher {
    matchers: Vec<Arc<dyn VersionMatcher>>,
}

impl Default for ChainVersionMatcher {
    fn default() -> Self {
        ChainVersionMatcher::standard(StatusManager::default())
    }
}

impl ChainVersionMatcher {
    pub const NAME: &'static str = "chain";

    pub fn new(matchers: Vec<Arc<dyn VersionMatcher>>) -> Self {
        ChainVersionMatcher { matchers }
    }

    /// Every built-in matcher, in the order they are consulted.
    pub fn standard(statuses: StatusManager) -> Self {
        ChainVersionMatcher::new(vec![
            Arc::new(LatestVersionMatcher::new(statuses)),
            Arc::new(SubVersionMatcher),
            Arc::new(VersionRangeMatcher::default()),
            Arc::new(MavenTimedSnapshotVersionMatcher::default()),
        ])
    }

    pub fn add(&mut self, matcher: Arc<dyn VersionMatcher>) {
        self.matchers.push(matcher);
    }

    pub fn matchers(&self) -> &[Arc<dyn VersionMatcher>] {
        &self.matchers
    }

    fn governing(&self, asked: &ModuleRevisionId) -> Option<&Arc<dyn VersionMatcher>> {
        self.matchers.iter().find(|m| m.is_dynamic(asked))
    }
}

impl VersionMatcher for ChainVersionMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        self.governing(asked).is_some()
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        match self.governing(asked) {
            Some(matcher) => matcher.accept(asked, found),
            None => ExactVersionMatcher.accept(asked, found),
        }
    }

    fn needs_module_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        self.governing(asked)
            .is_some_and(|m| m.needs_module_descriptor(asked, found))
    }

    fn accept_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleDescriptor) -> bool {
        match self.governing(asked) {
            Some(matcher) => matcher.accept_descriptor(asked, found),
            None => ExactVersionMatcher.accept(asked, &found.module_revision_id),
        }
    }
}

/// Names of the built-in matchers, in the order [`ChainVersionMatcher::standard`]
/// consults them.
pub const STANDARD_MATCHERS: [&str; 4] = [
    LatestVersionMatcher::NAME,
    SubVersionMatcher::NAME,
    VersionRangeMatcher::NAME,
    MavenTimedSnapshotVersionMatcher::NAME,
];

pub fn version_matcher(name: &str, statuses: &StatusManager) -> Option<Arc<dyn VersionMatcher>> {
    match name {
        LatestVersionMatcher::NAME => Some(Arc::new(LatestVersionMatcher::new(statuses.clone()))),
        SubVersionMatcher::NAME => Some(Arc::new(SubVersionMatcher)),
        VersionRangeMatcher::NAME => Some(Arc::new(VersionRangeMatcher::default())),
        MavenTimedSnapshotVersionMatcher::NAME => {
            Some(Arc::new(MavenTimedSnapshotVersionMatcher::default()))
        }
        ExactVersionMatcher::NAME => Some(Arc::new(ExactVersionMatcher)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mrid(revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::new("org", "mod", revision)
    }

    #[test]
    fn matchers_by_name() {
        let statuses = StatusManager::default();
        let chain = ChainVersionMatcher::new(
            ["sub-revision", "exact"]
                .iter()
                .filter_map(|name| version_matcher(name, &statuses))
                .collect(),
        );
        assert!(chain.is_dynamic(&mrid("1.0+")));
        assert!(!chain.is_dynamic(&mrid("latest.release")));
        assert!(chain.accept(&mrid("1.0+"), &mrid("1.0.3")));
        assert!(version_matcher("newest", &statuses).is_none());
        assert_eq!(
            STANDARD_MATCHERS
                .iter()
                .filter(|name| version_matcher(name, &statuses).is_some())
                .count(),
            4
        );
    }

    #[test]
    fn classify_revisions() {
        let matcher = ChainVersionMatcher::default();
        for dynamic in [
            "latest.integration",
            "latest.release",
            "1.0+",
            "[1.0,2.0)",
            "]1.0,2.0]",
            "(,2.0]",
            "[1.0,)",
            "1.0-20100925.223013-19",
        ] {
            assert!(matcher.is_dynamic(&mrid(dynamic)), "{dynamic} is dynamic");
        }
        for fixed in ["1.0", "1.0-SNAPSHOT", "latest", "[1.0]", "weird+rev"] {
            assert!(!matcher.is_dynamic(&mrid(fixed)), "{fixed} is fixed");
        }
    }

    #[test]
    fn unrecognized_revisions_match_exactly() {
        let matcher = ChainVersionMatcher::default();
        assert!(matcher.accept(&mrid("1.0"), &mrid("1.0")));
        assert!(!matcher.accept(&mrid("1.0"), &mrid("1.0.0")));
    }

    #[test]
    fn first_dynamic_matcher_governs() {
        let matcher = ChainVersionMatcher::default();
        assert!(matcher.accept(&mrid("1.0+"), &mrid("1.0.5")));
        assert!(!matcher.accept(&mrid("1.0+"), &mrid("1.1")));
        assert!(matcher.accept(&mrid("[1.0,2.0)"), &mrid("1.5")));
        assert!(!matcher.accept(&mrid("[1.0,2.0)"), &mrid("2.0")));
    }

    #[test]
    fn compare_relative_to_constraint() {
        let matcher = ChainVersionMatcher::default();
        let asked = mrid("[1.0,2.0)");
        assert_eq!(
            matcher.compare(&asked, &mrid("1.5"), &mrid("1.2")),
            Some(Ordering::Greater)
        );
        assert_eq!(
            matcher.compare(&asked, &mrid("3.0"), &mrid("1.2")),
            Some(Ordering::Less)
        );
        assert_eq!(matcher.compare(&asked, &mrid("3.0"), &mrid("0.1")), None);
    }
}
