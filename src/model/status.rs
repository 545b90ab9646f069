use std::cmp::Ordering;

pub const DEFAULT_STATUS: &str = "integration";

/// Ordered list of publication statuses, most mature first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusManager {
    statuses: Vec<String>,
}

impl Default for StatusManager {
    fn default() -> Self {
        StatusManager::new(["release", "milestone", "integration"])
    }
}

impl StatusManager {
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StatusManager {
            statuses: statuses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_status(&self, status: &str) -> bool {
        self.priority(status).is_some()
    }

    /// Position of the status in the list; `0` is the most mature.
    pub fn priority(&self, status: &str) -> Option<usize> {
        self.statuses.iter().position(|s| s == status)
    }

    /// The least mature status.
    pub fn lowest(&self) -> Option<&str> {
        self.statuses.last().map(String::as_str)
    }

    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    /// Whether `status` is at least as mature as `required`.
    pub fn satisfies(&self, status: &str, required: &str) -> bool {
        match (self.priority(status), self.priority(required)) {
            (Some(actual), Some(required)) => actual <= required,
            _ => false,
        }
    }

    /// Orders statuses from least to most mature; unknown statuses sort first.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let rank = |s: &str| {
            self.priority(s)
                .map(|p| self.statuses.len() - p)
                .unwrap_or(0)
        };
        rank(a).cmp(&rank(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maturity_ordering() {
        let statuses = StatusManager::default();
        assert!(statuses.satisfies("release", "integration"));
        assert!(statuses.satisfies("milestone", "milestone"));
        assert!(!statuses.satisfies("integration", "release"));
        assert!(!statuses.satisfies("nightly", "integration"));
        assert_eq!(statuses.compare("release", "milestone"), Ordering::Greater);
        assert_eq!(statuses.compare("nightly", "integration"), Ordering::Less);
    }
}
