use crate::matching::ItemOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Precision, 0 when nothing was detected
pub fn precision_from(true_positives: f64, false_positives: f64) -> f64 {
    let detected = true_positives + false_positives;
    if detected > 0.0 {
        true_positives / detected
    } else {
        0.0
    }
}

/// Recall, 1 when there was nothing to find
pub fn recall_from(true_positives: f64, false_negatives: f64) -> f64 {
    let expected = true_positives + false_negatives;
    if expected > 0.0 {
        true_positives / expected
    } else {
        1.0
    }
}

/// Weighted harmonic mean of precision and recall; `beta > 1` favours recall
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> f64 {
    if precision + recall <= 0.0 {
        return 0.0;
    }
    if precision == recall {
        return precision;
    }
    let beta_sq = beta * beta;
    let denominator = beta_sq * precision + recall;
    if denominator <= 0.0 {
        return 0.0;
    }
    (1.0 + beta_sq) * precision * recall / denominator
}

/// True/false positive and false negative counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    #[serde(rename = "tp")]
    pub true_positives: u64,
    #[serde(rename = "fn")]
    pub false_negatives: u64,
    #[serde(rename = "fp")]
    pub false_positives: u64,
}

impl OutcomeCounts {
    pub fn new(true_positives: u64, false_negatives: u64, false_positives: u64) -> Self {
        Self {
            true_positives,
            false_negatives,
            false_positives,
        }
    }

    pub fn add(&mut self, other: &OutcomeCounts) {
        self.true_positives += other.true_positives;
        self.false_negatives += other.false_negatives;
        self.false_positives += other.false_positives;
    }

    /// Ground-truth spans seen (`tp + fn`)
    pub fn ground_truth(&self) -> u64 {
        self.true_positives + self.false_negatives
    }

    /// Candidates seen (`tp + fp`)
    pub fn detections(&self) -> u64 {
        self.true_positives + self.false_positives
    }

    pub fn precision(&self) -> f64 {
        precision_from(self.true_positives as f64, self.false_positives as f64)
    }

    pub fn recall(&self) -> f64 {
        recall_from(self.true_positives as f64, self.false_negatives as f64)
    }

    pub fn metrics(&self) -> MetricSet {
        MetricSet::from_totals(
            self.true_positives as f64,
            self.false_negatives as f64,
            self.false_positives as f64,
        )
    }
}

/// Derived accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub f2: f64,
}

impl MetricSet {
    /// Metrics from (possibly weighted) totals
    pub fn from_totals(true_positives: f64, false_negatives: f64, false_positives: f64) -> Self {
        let precision = precision_from(true_positives, false_positives);
        let recall = recall_from(true_positives, false_negatives);
        Self {
            precision,
            recall,
            f1: f_beta(precision, recall, 1.0),
            f2: f_beta(precision, recall, 2.0),
        }
    }
}

/// Accumulates per-category counts across a corpus pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsAggregator {
    counts: BTreeMap<String, OutcomeCounts>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: BTreeMap<String, OutcomeCounts>) -> Self {
        Self { counts }
    }

    pub fn add(&mut self, category: &str, counts: &OutcomeCounts) {
        self.counts.entry(category.to_string()).or_default().add(counts);
    }

    pub fn add_item(&mut self, outcome: &ItemOutcome) {
        for (category, counts) in outcome.counts() {
            self.add(&category, &counts);
        }
    }

    #[must_use]
    pub fn merge(mut self, other: MetricsAggregator) -> Self {
        for (category, counts) in &other.counts {
            self.add(category, counts);
        }
        self
    }

    pub fn counts(&self) -> &BTreeMap<String, OutcomeCounts> {
        &self.counts
    }

    /// Counts summed over every category
    pub fn totals(&self) -> OutcomeCounts {
        let mut totals = OutcomeCounts::default();
        for counts in self.counts.values() {
            totals.add(counts);
        }
        totals
    }

    pub fn overall(&self) -> MetricSet {
        self.totals().metrics()
    }

    pub fn per_category(&self) -> BTreeMap<String, MetricSet> {
        self.counts
            .iter()
            .map(|(category, counts)| (category.clone(), counts.metrics()))
            .collect()
    }

    /// Metrics after scaling each category's counts by its weight.
    ///
    /// Categories without a weight contribute nothing.
    pub fn weighted(&self, weights: &BTreeMap<String, f64>) -> MetricSet {
        let (mut tp, mut fn_, mut fp) = (0.0, 0.0, 0.0);
        for (category, counts) in &self.counts {
            let weight = weights.get(category).copied().unwrap_or(0.0);
            tp += counts.true_positives as f64 * weight;
            fn_ += counts.false_negatives as f64 * weight;
            fp += counts.false_positives as f64 * weight;
        }
        MetricSet::from_totals(tp, fn_, fp)
    }
}

/// Minimum recall, precision and F2 a metric set must reach
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricGate {
    pub min_recall: f64,
    pub min_precision: f64,
    pub min_f2: f64,
}

impl Default for MetricGate {
    fn default() -> Self {
        Self {
            min_recall: 0.95,
            min_precision: 0.70,
            min_f2: 0.90,
        }
    }
}

impl MetricGate {
    /// Human-readable list of unmet minimums; empty when all pass
    pub fn check(&self, metrics: &MetricSet) -> Vec<String> {
        [
            ("Recall", metrics.recall, self.min_recall),
            ("Precision", metrics.precision, self.min_precision),
            ("F2", metrics.f2, self.min_f2),
        ]
        .into_iter()
        .filter(|(_, value, minimum)| value < minimum)
        .map(|(name, value, minimum)| {
            format!("{name} {:.1}% < {:.0}% target", value * 100.0, minimum * 100.0)
        })
        .collect()
    }
}
