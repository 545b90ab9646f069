use std::{fmt::Debug, sync::Arc};

use log::debug;
use thiserror::Error;

use crate::{
    latest::{find_latest, ArtifactInfo, LatestRevisionStrategy, LatestStrategy},
    model::ModuleRevisionId,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Conflicting revisions of {module}: {}", revisions.join(", "))]
    Strict {
        module: String,
        revisions: Vec<String>,
    },
}

/// One revision of a module reached during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCandidate {
    pub id: ModuleRevisionId,
    /// Some edge requesting this revision is forced.
    pub forced: bool,
    pub publication: u64,
    pub status: String,
}

impl ArtifactInfo for ConflictCandidate {
    fn revision(&self) -> &str {
        self.id.revision()
    }

    fn last_modified(&self) -> u64 {
        self.publication
    }

    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }
}

/// Picks the revisions that survive among several revisions of the same
/// module. Every candidate not returned is evicted.
pub trait ConflictManager: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn resolve_conflicts(
        &self,
        candidates: &[ConflictCandidate],
    ) -> Result<Vec<ModuleRevisionId>, ConflictError>;
}

fn forced(candidates: &[ConflictCandidate]) -> Vec<ConflictCandidate> {
    candidates.iter().filter(|c| c.forced).cloned().collect()
}

/// Keeps the most recent revision. A forced revision beats any unforced one.
#[derive(Debug, Clone)]
pub struct LatestConflictManager {
    strategy: Arc<dyn LatestStrategy>,
}

impl Default for LatestConflictManager {
    fn default() -> Self {
        LatestConflictManager::new(Arc::new(LatestRevisionStrategy::default()))
    }
}

impl LatestConflictManager {
    pub const NAME: &'static str = "latest-revision";

    pub fn new(strategy: Arc<dyn LatestStrategy>) -> Self {
        LatestConflictManager { strategy }
    }
}

impl ConflictManager for LatestConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        candidates: &[ConflictCandidate],
    ) -> Result<Vec<ModuleRevisionId>, ConflictError> {
        let forced = forced(candidates);
        let pool = if forced.is_empty() { candidates } else { &forced };
        let winner = find_latest(self.strategy.as_ref(), pool);
        if let Some(winner) = winner {
            debug!(
                "{} wins among {} candidates ({})",
                winner.id,
                candidates.len(),
                self.strategy.name()
            );
        }
        Ok(winner.map(|w| w.id.clone()).into_iter().collect())
    }
}

/// Refuses to choose: two different unforced revisions are an error.
#[derive(Debug, Clone)]
pub struct StrictConflictManager {
    strategy: Arc<dyn LatestStrategy>,
}

impl Default for StrictConflictManager {
    fn default() -> Self {
        StrictConflictManager::new(Arc::new(LatestRevisionStrategy::default()))
    }
}

impl StrictConflictManager {
    pub const NAME: &'static str = "strict";

    pub fn new(strategy: Arc<dyn LatestStrategy>) -> Self {
        StrictConflictManager { strategy }
    }
}

impl ConflictManager for StrictConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        candidates: &[ConflictCandidate],
    ) -> Result<Vec<ModuleRevisionId>, ConflictError> {
        let forced = forced(candidates);
        if !forced.is_empty() {
            return Ok(find_latest(self.strategy.as_ref(), &forced)
                .map(|w| w.id.clone())
                .into_iter()
                .collect());
        }
        match candidates {
            [] => Ok(vec![]),
            [single] => Ok(vec![single.id.clone()]),
            [first, ..] => Err(ConflictError::Strict {
                module: first.id.module_id().to_string(),
                revisions: candidates
                    .iter()
                    .map(|c| c.id.revision().to_string())
                    .collect(),
            }),
        }
    }
}

/// Keeps every revision.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllConflictManager;

impl AllConflictManager {
    pub const NAME: &'static str = "all";
}

impl ConflictManager for AllConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        candidates: &[ConflictCandidate],
    ) -> Result<Vec<ModuleRevisionId>, ConflictError> {
        Ok(candidates.iter().map(|c| c.id.clone()).collect())
    }
}

/// Looks a conflict manager up by name, ranking with `strategy`.
pub fn conflict_manager(
    name: &str,
    strategy: Arc<dyn LatestStrategy>,
) -> Option<Arc<dyn ConflictManager>> {
    match name {
        LatestConflictManager::NAME | "latest" => Some(Arc::new(LatestConflictManager::new(strategy))),
        StrictConflictManager::NAME => Some(Arc::new(StrictConflictManager::new(strategy))),
        AllConflictManager::NAME => Some(Arc::new(AllConflictManager)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::latest::LatestTimeStrategy;

    fn candidate(rev: &str, forced: bool, publication: u64) -> ConflictCandidate {
        ConflictCandidate {
            id: ModuleRevisionId::new("org", "mod", rev),
            forced,
            publication,
            status: "integration".to_string(),
        }
    }

    fn revisions(winners: Vec<ModuleRevisionId>) -> Vec<String> {
        winners.iter().map(|w| w.revision().to_string()).collect()
    }

    #[test]
    fn latest_keeps_highest_revision() {
        let manager = LatestConflictManager::default();
        let winners = manager
            .resolve_conflicts(&[candidate("1.0", false, 0), candidate("2.0", false, 0)])
            .unwrap();
        assert_eq!(revisions(winners), vec!["2.0"]);
    }

    #[test]
    fn forced_revision_wins() {
        let manager = LatestConflictManager::default();
        let winners = manager
            .resolve_conflicts(&[candidate("1.0", true, 0), candidate("2.0", false, 0)])
            .unwrap();
        assert_eq!(revisions(winners), vec!["1.0"]);

        let strict = StrictConflictManager::default();
        let winners = strict
            .resolve_conflicts(&[candidate("2.0", false, 0), candidate("1.0", true, 0)])
            .unwrap();
        assert_eq!(revisions(winners), vec!["1.0"]);
    }

    #[test]
    fn latest_uses_its_strategy() {
        let manager = LatestConflictManager::new(Arc::new(LatestTimeStrategy));
        let winners = manager
            .resolve_conflicts(&[candidate("1.0", false, 20), candidate("2.0", false, 10)])
            .unwrap();
        assert_eq!(revisions(winners), vec!["1.0"]);
    }

    #[test]
    fn strict_rejects_conflicts() {
        let err = StrictConflictManager::default()
            .resolve_conflicts(&[candidate("1.0", false, 0), candidate("2.0", false, 0)])
            .unwrap_err();
        assert_eq!(
            err,
            ConflictError::Strict {
                module: "org#mod".to_string(),
                revisions: vec!["1.0".to_string(), "2.0".to_string()],
            }
        );
    }

    #[test]
    fn all_keeps_everything() {
        let winners = AllConflictManager
            .resolve_conflicts(&[candidate("1.0", false, 0), candidate("2.0", false, 0)])
            .unwrap();
        assert_eq!(revisions(winners), vec!["1.0", "2.0"]);
    }

    #[test]
    fn lookup_by_name() {
        let strategy: Arc<dyn LatestStrategy> = Arc::new(LatestRevisionStrategy::default());
        for name in ["latest-revision", "strict", "all"] {
            assert_eq!(conflict_manager(name, strategy.clone()).unwrap().name(), name);
        }
        assert!(conflict_manager("newest", strategy).is_none());
    }
}
