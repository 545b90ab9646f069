//! Strategies picking the most recent candidate among several revisions of
//! the same module.
//!
//! Every strategy defines a total order over candidates. [`find_latest`] keeps
//! the last candidate among those that compare equal, so the order in which
//! candidates are listed only matters for ties.

use std::{cmp::Ordering, collections::HashMap, fmt::Debug, sync::Arc};

use crate::model::StatusManager;

/// What a strategy needs to know about a candidate.
pub trait ArtifactInfo {
    fn revision(&self) -> &str;

    /// Milliseconds since the Unix epoch.
    fn last_modified(&self) -> u64;

    fn status(&self) -> Option<&str> {
        None
    }
}

pub trait LatestStrategy: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// `Greater` when `a` is more recent than `b`.
    fn compare(&self, a: &dyn ArtifactInfo, b: &dyn ArtifactInfo) -> Ordering;

    /// Whether candidates must be compared with the status and publication
    /// date of their descriptor rather than bare revisions.
    fn needs_descriptor(&self) -> bool {
        false
    }
}

/// The most recent candidate, the later-listed one winning ties. `None` only
/// for an empty slice.
pub fn find_latest<'a, T: ArtifactInfo>(
    strategy: &dyn LatestStrategy,
    candidates: &'a [T],
) -> Option<&'a T> {
    candidates.iter().reduce(|best, candidate| {
        if strategy.compare(candidate, best) == Ordering::Less {
            best
        } else {
            candidate
        }
    })
}

/// Sorts candidates from oldest to most recent; ties keep their relative order.
pub fn sort<T: ArtifactInfo>(strategy: &dyn LatestStrategy, candidates: &mut [T]) {
    candidates.sort_by(|a, b| strategy.compare(a, b));
}

#[derive(Debug, Clone)]
pub struct LatestRevisionStrategy {
    special_meanings: HashMap<String, i32>,
}

impl Default for LatestRevisionStrategy {
    fn default() -> Self {
        LatestRevisionStrategy {
            special_meanings: HashMap::from([
                ("dev".to_string(), -1),
                ("rc".to_string(), 1),
                ("final".to_string(), 2),
            ]),
        }
    }
}

impl LatestRevisionStrategy {
    pub const NAME: &'static str = "latest-revision";

    pub fn with_special_meaning(mut self, qualifier: &str, value: i32) -> Self {
        self.special_meanings.insert(qualifier.to_lowercase(), value);
        self
    }

    /// Orders revision strings segment by segment. Numeric segments compare
    /// numerically and sort after textual ones; textual segments use their
    /// special meaning when they have one (an unqualified revision counts as
    /// `0`), lexical order otherwise.
    pub fn compare_revisions(&self, rev1: &str, rev2: &str) -> Ordering {
        let rev1 = split_letters_and_digits(rev1);
        let rev2 = split_letters_and_digits(rev2);
        let parts1 = segments(&rev1);
        let parts2 = segments(&rev2);

        for (p1, p2) in parts1.iter().zip(parts2.iter()) {
            if p1 == p2 {
                continue;
            }
            match (is_number(p1), is_number(p2)) {
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (true, true) => return compare_numbers(p1, p2),
                (false, false) => {}
            }
            let sm1 = self.special_meanings.get(&p1.to_lowercase());
            let sm2 = self.special_meanings.get(&p2.to_lowercase());
            return match (sm1, sm2) {
                (Some(sm1), sm2) => sm1.cmp(sm2.unwrap_or(&0)),
                (None, Some(sm2)) => 0.cmp(sm2),
                (None, None) => p1.cmp(p2),
            };
        }

        let common = parts1.len().min(parts2.len());
        if let Some(extra) = parts1.get(common) {
            return if is_number(extra) {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        if let Some(extra) = parts2.get(common) {
            return if is_number(extra) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        Ordering::Equal
    }
}

impl LatestStrategy for LatestRevisionStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(&self, a: &dyn ArtifactInfo, b: &dyn ArtifactInfo) -> Ordering {
        self.compare_revisions(a.revision(), b.revision())
    }
}

fn split_letters_and_digits(revision: &str) -> String {
    let mut result = String::with_capacity(revision.len() + 4);
    let mut previous: Option<char> = None;
    for c in revision.chars() {
        if let Some(p) = previous {
            let boundary = (p.is_ascii_alphabetic() && c.is_ascii_digit())
                || (p.is_ascii_digit() && c.is_ascii_alphabetic());
            if boundary {
                result.push('.');
            }
        }
        result.push(c);
        previous = Some(c);
    }
    result
}

fn segments(revision: &str) -> Vec<&str> {
    revision
        .split(['.', '_', '-', '+'])
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LatestLexicographicStrategy;

impl LatestLexicographicStrategy {
    pub const NAME: &'static str = "latest-lexico";
}

impl LatestStrategy for LatestLexicographicStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(&self, a: &dyn ArtifactInfo, b: &dyn ArtifactInfo) -> Ordering {
        a.revision().cmp(b.revision())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LatestTimeStrategy;

impl LatestTimeStrategy {
    pub const NAME: &'static str = "latest-time";
}

impl LatestStrategy for LatestTimeStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(&self, a: &dyn ArtifactInfo, b: &dyn ArtifactInfo) -> Ordering {
        a.last_modified().cmp(&b.last_modified())
    }
}

/// Most mature status first, then most recent publication.
#[derive(Debug, Clone, Default)]
pub struct LatestStatusStrategy {
    statuses: StatusManager,
}

impl LatestStatusStrategy {
    pub const NAME: &'static str = "latest-status";

    pub fn new(statuses: StatusManager) -> Self {
        LatestStatusStrategy { statuses }
    }
}

impl LatestStrategy for LatestStatusStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(&self, a: &dyn ArtifactInfo, b: &dyn ArtifactInfo) -> Ordering {
        self.statuses
            .compare(a.status().unwrap_or_default(), b.status().unwrap_or_default())
            .then_with(|| a.last_modified().cmp(&b.last_modified()))
    }

    fn needs_descriptor(&self) -> bool {
        true
    }
}

/// Looks a strategy up by name.
pub fn latest_strategy(name: &str, statuses: &StatusManager) -> Option<Arc<dyn LatestStrategy>> {
    match name {
        LatestRevisionStrategy::NAME => Some(Arc::new(LatestRevisionStrategy::default())),
        LatestLexicographicStrategy::NAME => Some(Arc::new(LatestLexicographicStrategy)),
        LatestTimeStrategy::NAME => Some(Arc::new(LatestTimeStrategy)),
        LatestStatusStrategy::NAME => Some(Arc::new(LatestStatusStrategy::new(statuses.clone()))),
        _ => None,
    }
}

/// A bare revision, for comparisons where nothing else is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInfo {
    pub revision: String,
    pub last_modified: u64,
}

impl RevisionInfo {
    pub fn new(revision: impl Into<String>, last_modified: u64) -> Self {
        RevisionInfo {
            revision: revision.into(),
            last_modified,
        }
    }
}

impl ArtifactInfo for RevisionInfo {
    fn revision(&self) -> &str {
        &self.revision
    }

    fn last_modified(&self) -> u64 {
        self.last_modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn infos(revisions: &[&str]) -> Vec<RevisionInfo> {
        revisions.iter().map(|r| RevisionInfo::new(*r, 0)).collect()
    }

    #[test]
    fn sort_revisions() {
        let mut candidates = infos(&[
            "1.0", "0.2a", "1.0-dev1", "0.2", "1.0.1", "0.2b", "1.0-rc1", "1.0-final",
            "0.2-final", "1.0-dev2", "0.2-rc1",
        ]);
        candidates.reverse();
        sort(&LatestRevisionStrategy::default(), &mut candidates);
        let sorted: Vec<_> = candidates.iter().map(|c| c.revision.as_str()).collect();
        assert_eq!(
            sorted,
            vec![
                "0.2a", "0.2b", "0.2-rc1", "0.2-final", "0.2", "1.0-dev1", "1.0-dev2", "1.0-rc1",
                "1.0-final", "1.0", "1.0.1",
            ]
        );
    }

    #[test]
    fn numbers_compare_numerically() {
        let strategy = LatestRevisionStrategy::default();
        assert_eq!(strategy.compare_revisions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(strategy.compare_revisions("1.010", "1.10"), Ordering::Equal);
        assert_eq!(
            strategy.compare_revisions("2.0.123456789012345678901234567890", "2.0.9"),
            Ordering::Greater
        );
    }

    #[test]
    fn custom_special_meanings() {
        let strategy = LatestRevisionStrategy::default()
            .with_special_meaning("alpha", -3)
            .with_special_meaning("beta", -2);
        let candidates = infos(&["1.0-beta", "1.0", "1.0-alpha"]);
        assert_eq!(find_latest(&strategy, &candidates).unwrap().revision, "1.0");
        assert_eq!(
            strategy.compare_revisions("1.0-alpha", "1.0-beta"),
            Ordering::Less
        );
    }

    #[test]
    fn ties_go_to_the_last_candidate() {
        let candidates = vec![RevisionInfo::new("a", 10), RevisionInfo::new("b", 10)];
        assert_eq!(
            find_latest(&LatestTimeStrategy, &candidates).unwrap().revision,
            "b"
        );
        let empty: Vec<RevisionInfo> = vec![];
        assert!(find_latest(&LatestTimeStrategy, &empty).is_none());
    }

    #[test]
    fn strategies_by_name() {
        let statuses = StatusManager::default();
        for name in ["latest-revision", "latest-lexico", "latest-time", "latest-status"] {
            assert_eq!(latest_strategy(name, &statuses).unwrap().name(), name);
        }
        assert!(latest_strategy("newest", &statuses).is_none());
    }

    #[test]
    fn latest_time_ignores_revision() {
        let candidates = vec![
            RevisionInfo::new("3.0", 100),
            RevisionInfo::new("1.0", 300),
            RevisionInfo::new("2.0", 200),
        ];
        assert_eq!(
            find_latest(&LatestTimeStrategy, &candidates).unwrap().revision,
            "1.0"
        );
        assert_eq!(
            find_latest(&LatestLexicographicStrategy, &candidates)
                .unwrap()
                .revision,
            "3.0"
        );
    }
}
