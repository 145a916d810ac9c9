use crate::metrics::OutcomeCounts;
use config_engine::PhiSettings;
use deidentification_engine::{Candidate, GroundTruthSpan, Span};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Jaccard overlap of two half-open spans, 0 when disjoint
pub fn overlap(a: &Span, b: &Span) -> f64 {
    let intersection = a.intersection_len(b);
    if intersection == 0 {
        return 0.0;
    }
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Ground-truth span paired with the candidate that claimed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub ground_truth: GroundTruthSpan,
    pub candidate: Candidate,
    pub overlap: f64,
}

/// Outcome of matching one corpus item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub matched: Vec<MatchedPair>,
    /// Ground truth no candidate claimed
    pub missed: Vec<GroundTruthSpan>,
    /// Candidates that claimed no ground truth
    pub spurious: Vec<Candidate>,
}

impl ItemOutcome {
    /// Per-category counts.
    ///
    /// True positives and false negatives count under the ground-truth
    /// category, false positives under the candidate's own category.
    pub fn counts(&self) -> BTreeMap<String, OutcomeCounts> {
        let mut counts: BTreeMap<String, OutcomeCounts> = BTreeMap::new();
        for pair in &self.matched {
            counts
                .entry(pair.ground_truth.category.clone())
                .or_default()
                .true_positives += 1;
        }
        for missed in &self.missed {
            counts.entry(missed.category.clone()).or_default().false_negatives += 1;
        }
        for spurious in &self.spurious {
            counts.entry(spurious.category.clone()).or_default().false_positives += 1;
        }
        counts
    }
}

/// Decides which candidate, if any, accounts for each ground-truth span
#[derive(Debug, Clone, PartialEq)]
pub struct SpanMatcher {
    overlap_threshold: f64,
    compatibility: BTreeMap<String, Vec<String>>,
}

impl SpanMatcher {
    pub fn new(overlap_threshold: f64, compatibility: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            overlap_threshold,
            compatibility,
        }
    }

    pub fn from_settings(settings: &PhiSettings) -> Self {
        Self::new(
            settings.evaluation.overlap_threshold,
            settings.compatibility.clone(),
        )
    }

    pub fn overlap_threshold(&self) -> f64 {
        self.overlap_threshold
    }

    /// Whether a candidate category counts for a ground-truth category.
    ///
    /// Categories missing from the map only accept themselves.
    pub fn accepts(&self, ground_truth_category: &str, candidate_category: &str) -> bool {
        self.compatibility.get(ground_truth_category).map_or(
            ground_truth_category == candidate_category,
            |accepted| accepted.iter().any(|c| c == candidate_category),
        )
    }

    pub fn matches(&self, ground_truth: &GroundTruthSpan, candidate: &Candidate) -> bool {
        let ratio = overlap(&ground_truth.span, &candidate.span);
        ratio > 0.0
            && ratio >= self.overlap_threshold
            && self.accepts(&ground_truth.category, &candidate.category)
    }

    /// Match one item's ground truth against its candidates.
    ///
    /// Ground truth is visited in order; each claims the best-overlapping
    /// compatible candidate not already claimed, the earliest candidate
    /// winning ties.
    pub fn evaluate_item(
        &self,
        ground_truth: &[GroundTruthSpan],
        candidates: &[Candidate],
    ) -> ItemOutcome {
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut outcome = ItemOutcome::default();

        for expected in ground_truth {
            let mut best: Option<(usize, f64)> = None;
            for (index, candidate) in candidates.iter().enumerate() {
                if claimed.contains(&index) || !self.matches(expected, candidate) {
                    continue;
                }
                let ratio = overlap(&expected.span, &candidate.span);
                if best.map_or(true, |(_, current)| ratio > current) {
                    best = Some((index, ratio));
                }
            }

            match best.and_then(|(index, ratio)| candidates.get(index).map(|c| (index, c, ratio))) {
                Some((index, candidate, ratio)) => {
                    claimed.insert(index);
                    outcome.matched.push(MatchedPair {
                        ground_truth: expected.clone(),
                        candidate: candidate.clone(),
                        overlap: ratio,
                    });
                }
                None => outcome.missed.push(expected.clone()),
            }
        }

        outcome.spurious = candidates
            .iter()
            .enumerate()
            .filter(|(index, _)| !claimed.contains(index))
            .map(|(_, candidate)| candidate.clone())
            .collect();
        outcome
    }
}
