use std::{cmp::Ordering, sync::Arc};

use regex_lite::Regex;

use crate::{
    latest::{LatestStrategy, LatestRevisionStrategy, RevisionInfo},
    model::ModuleRevisionId,
};

use super::VersionMatcher;

const ANY: &str = r"[^\s,\[\]()]";

/// Mathematical ranges: `[1.0,2.0]`, `[1.0,2.0[`, `]1.0,2.0)`, `[1.0,)`,
/// `(,2.0]`. `[` opens inclusive, `]` or `(` opens exclusive; `]` closes
/// inclusive, `[` or `)` closes exclusive.
#[derive(Debug, Clone)]
pub struct VersionRangeMatcher {
    finite: Regex,
    lower_infinite: Regex,
    upper_infinite: Regex,
    strategy: Arc<dyn LatestStrategy>,
}

impl Default for VersionRangeMatcher {
    fn default() -> Self {
        VersionRangeMatcher::new(Arc::new(LatestRevisionStrategy::default()))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Range<'a> {
    lower: Option<&'a str>,
    upper: Option<&'a str>,
    lower_inclusive: bool,
    upper_inclusive: bool,
}

impl VersionRangeMatcher {
    pub const NAME: &'static str = "version-range";

    /// Bounds are compared with `strategy`.
    pub fn new(strategy: Arc<dyn LatestStrategy>) -> Self {
        let open = r"[\[\]\(]";
        let open_exclusive = r"[\]\(]";
        let close = r"[\[\]\)]";
        let close_exclusive = r"[\[\)]";
        let build = |pattern: String| Regex::new(&pattern).unwrap();
        VersionRangeMatcher {
            finite: build(format!(
                r"^{open}\s*({ANY}+)\s*,\s*({ANY}+)\s*{close}$"
            )),
            lower_infinite: build(format!(r"^{open_exclusive}\s*,\s*({ANY}+)\s*{close}$")),
            upper_infinite: build(format!(r"^{open}\s*({ANY}+)\s*,\s*{close_exclusive}$")),
            strategy,
        }
    }

    fn parse<'a>(&self, revision: &'a str) -> Option<Range<'a>> {
        let lower_inclusive = revision.starts_with('[');
        let upper_inclusive = revision.ends_with(']');
        if let Some(captures) = self.finite.captures(revision) {
            return Some(Range {
                lower: captures.get(1).map(|m| m.as_str()),
                upper: captures.get(2).map(|m| m.as_str()),
                lower_inclusive,
                upper_inclusive,
            });
        }
        if let Some(captures) = self.lower_infinite.captures(revision) {
            return Some(Range {
                lower: None,
                upper: captures.get(1).map(|m| m.as_str()),
                lower_inclusive: false,
                upper_inclusive,
            });
        }
        if let Some(captures) = self.upper_infinite.captures(revision) {
            return Some(Range {
                lower: captures.get(1).map(|m| m.as_str()),
                upper: None,
                lower_inclusive,
                upper_inclusive: false,
            });
        }
        None
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.strategy
            .compare(&RevisionInfo::new(a, 0), &RevisionInfo::new(b, 0))
    }
}

impl VersionMatcher for VersionRangeMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        self.parse(asked.revision()).is_some()
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        let Some(range) = self.parse(asked.revision()) else {
            return false;
        };
        let found = found.revision();
        let above_lower = range.lower.map_or(true, |lower| {
            match self.compare(found, lower) {
                Ordering::Greater => true,
                Ordering::Equal => range.lower_inclusive,
                Ordering::Less => false,
            }
        });
        let below_upper = range.upper.map_or(true, |upper| {
            match self.compare(found, upper) {
                Ordering::Less => true,
                Ordering::Equal => range.upper_inclusive,
                Ordering::Greater => false,
            }
        });
        above_lower && below_upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn accepts(asked: &str, found: &str) -> bool {
        VersionRangeMatcher::default().accept(
            &ModuleRevisionId::new("org", "mod", asked),
            &ModuleRevisionId::new("org", "mod", found),
        )
    }

    #[test]
    fn parse_forms() {
        let matcher = VersionRangeMatcher::default();
        assert_eq!(
            matcher.parse("[1.0, 2.0["),
            Some(Range {
                lower: Some("1.0"),
                upper: Some("2.0"),
                lower_inclusive: true,
                upper_inclusive: false,
            })
        );
        assert_eq!(
            matcher.parse("(,2.0]"),
            Some(Range {
                lower: None,
                upper: Some("2.0"),
                lower_inclusive: false,
                upper_inclusive: true,
            })
        );
        assert_eq!(
            matcher.parse("[1.0,)"),
            Some(Range {
                lower: Some("1.0"),
                upper: None,
                lower_inclusive: true,
                upper_inclusive: false,
            })
        );
        assert_eq!(matcher.parse("[1.0]"), None);
        assert_eq!(matcher.parse("[,]"), None);
        assert_eq!(matcher.parse("1.0"), None);
    }

    #[test]
    fn finite_bounds() {
        assert!(accepts("[1.0,2.0]", "1.0"));
        assert!(accepts("[1.0,2.0]", "2.0"));
        assert!(accepts("[1.0,2.0]", "1.5.3"));
        assert!(!accepts("]1.0,2.0]", "1.0"));
        assert!(!accepts("[1.0,2.0[", "2.0"));
        assert!(!accepts("[1.0,2.0)", "2.0"));
        assert!(!accepts("[1.0,2.0]", "2.0.1"));
        assert!(!accepts("[1.0,2.0]", "0.9"));
    }

    #[test]
    fn infinite_bounds() {
        assert!(accepts("[1.0,)", "99.0"));
        assert!(!accepts("]1.0,)", "1.0"));
        assert!(accepts("(,2.0]", "0.0.1"));
        assert!(!accepts("(,2.0)", "2.0"));
    }
}
