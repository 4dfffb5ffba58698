//! Top-k selection of candidate papers
//!
//! Ranking is a stable descending sort on score, so equal scores keep
//! their original order. Selection drops excluded identifiers (existing
//! children and the parent itself) and repeated candidates before
//! truncating.

use citeweave_common::ids::PaperId;
use citeweave_common::models::{NetworkNode, Paper};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Anything that can compete for a child slot
pub trait Candidate {
    /// Normalized identifier, `None` if the candidate has none
    fn candidate_id(&self) -> Option<&PaperId>;

    /// Ranking score in the canonical 0-1 range
    fn candidate_score(&self) -> f64;
}

impl Candidate for Paper {
    fn candidate_id(&self) -> Option<&PaperId> {
        Some(&self.id)
    }

    fn candidate_score(&self) -> f64 {
        self.score_or_zero()
    }
}

impl Candidate for NetworkNode {
    fn candidate_id(&self) -> Option<&PaperId> {
        self.paper_id.as_ref()
    }

    fn candidate_score(&self) -> f64 {
        self.rank_score()
    }
}

/// Deterministic ranking and pruning
#[derive(Debug, Clone, Copy, Default)]
pub struct TopKSelector;

impl TopKSelector {
    /// Stable sort by score, highest first
    pub fn rank<T: Candidate>(mut candidates: Vec<T>) -> Vec<T> {
        candidates.sort_by(|a, b| {
            b.candidate_score()
                .partial_cmp(&a.candidate_score())
                .unwrap_or(Ordering::Equal)
        });
        candidates
    }

    /// Rank, remove excluded and repeated identifiers, keep the best `k`
    pub fn select_top<T: Candidate>(
        candidates: Vec<T>,
        k: usize,
        exclude: &HashSet<PaperId>,
    ) -> Vec<T> {
        let mut seen: HashSet<PaperId> = HashSet::new();
        let mut selected = Vec::with_capacity(k);

        for candidate in Self::rank(candidates) {
            if selected.len() == k {
                break;
            }
            let Some(id) = candidate.candidate_id() else {
                continue;
            };
            if exclude.contains(id) || !seen.insert(id.clone()) {
                continue;
            }
            selected.push(candidate);
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn paper(id: &str, score: f64) -> Paper {
        let mut paper = Paper::minimal(PaperId::normalize(id).unwrap(), id);
        paper.score = Some(score);
        paper
    }

    fn ids(papers: &[Paper]) -> Vec<&str> {
        papers.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_ties_keep_original_order() {
        let ranked = TopKSelector::rank(vec![
            paper("A", 0.5),
            paper("B", 0.8),
            paper("C", 0.8),
            paper("D", 0.9),
        ]);
        assert_eq!(ids(&ranked), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn test_select_top_with_exclusions() {
        let exclude: HashSet<PaperId> = [PaperId::normalize("P1").unwrap(), PaperId::normalize("B").unwrap()]
            .into_iter()
            .collect();

        let selected = TopKSelector::select_top(
            vec![
                paper("P1", 1.0),
                paper("A", 0.2),
                paper("B", 0.9),
                paper("C", 0.7),
                paper("D", 0.4),
            ],
            3,
            &exclude,
        );
        assert_eq!(ids(&selected), vec!["C", "D", "A"]);
    }

    #[test]
    fn test_select_top_drops_repeated_ids() {
        let selected = TopKSelector::select_top(
            vec![paper("A", 0.9), paper("corpus:A", 0.8), paper("B", 0.1)],
            3,
            &HashSet::new(),
        );
        assert_eq!(ids(&selected), vec!["A", "B"]);
    }

    #[test]
    fn test_fewer_candidates_than_k() {
        let selected = TopKSelector::select_top(vec![paper("A", 0.3)], 3, &HashSet::new());
        assert_eq!(selected.len(), 1);
        assert!(TopKSelector::select_top(Vec::<Paper>::new(), 3, &HashSet::new()).is_empty());
    }

    fn candidate_set() -> impl Strategy<Value = Vec<(u8, u8)>> {
        prop::collection::vec((0u8..12, 0u8..=100), 0..20)
    }

    proptest! {
        #[test]
        fn prop_select_top_is_idempotent(raw in candidate_set(), excluded in prop::collection::vec(0u8..12, 0..4)) {
            let build = || -> Vec<Paper> {
                raw.iter()
                    .map(|(id, score)| paper(&format!("P{}", id), f64::from(*score) / 100.0))
                    .collect()
            };
            let exclude: HashSet<PaperId> = excluded
                .iter()
                .map(|id| PaperId::normalize(&format!("P{}", id)).unwrap())
                .collect();

            let first = TopKSelector::select_top(build(), 3, &exclude);
            let second = TopKSelector::select_top(build(), 3, &exclude);
            let reselected = TopKSelector::select_top(first.clone(), 3, &exclude);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&first, &reselected);
            prop_assert!(first.len() <= 3);
            prop_assert!(first.iter().all(|p| !exclude.contains(&p.id)));
        }
    }
}
