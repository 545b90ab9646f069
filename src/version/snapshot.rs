use regex_lite::Regex;

use crate::model::ModuleRevisionId;

use super::VersionMatcher;

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// Timestamped snapshots, `1.0-20100925.223013-19`: dynamic, accepting the
/// `1.0-SNAPSHOT` line and any timestamped build of the same base revision.
#[derive(Debug, Clone)]
pub struct MavenTimedSnapshotVersionMatcher {
    pattern: Regex,
}

impl Default for MavenTimedSnapshotVersionMatcher {
    fn default() -> Self {
        MavenTimedSnapshotVersionMatcher {
            pattern: Regex::new(r"^(.*)-([0-9]{8}\.[0-9]{6})-([0-9]+)$").unwrap(),
        }
    }
}

impl MavenTimedSnapshotVersionMatcher {
    pub const NAME: &'static str = "maven-timed-snapshot";

    /// The base revision of a timestamped snapshot, `None` for anything else.
    fn timed_base<'a>(&self, revision: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(revision)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// The base revision of either snapshot form.
    fn snapshot_base<'a>(&self, revision: &'a str) -> Option<&'a str> {
        self.timed_base(revision)
            .or_else(|| revision.strip_suffix(SNAPSHOT_SUFFIX))
    }
}

impl VersionMatcher for MavenTimedSnapshotVersionMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        self.timed_base(asked.revision()).is_some()
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        match self.timed_base(asked.revision()) {
            Some(base) => self.snapshot_base(found.revision()) == Some(base),
            None => false,
        }
    }
}
