//! Per-category threshold sweep and selection
//!
//! For each category with enough ground truth, every swept threshold is
//! evaluated over the corpus. Among thresholds whose recall meets the floor
//! the one with the highest F2 wins; thresholds within a small F2 tolerance of
//! the best are tie-broken toward higher recall. When no threshold reaches the
//! floor, the highest-recall threshold is used and the category is flagged.

use crate::corpus::{CorpusItem, Exclusion};
use crate::matching::SpanMatcher;
use crate::metrics::OutcomeCounts;
use chrono::{DateTime, Utc};
use config_engine::{PhiSettings, ThresholdSettings};
use deidentification_engine::{Candidate, DenyListTable};
use error_common::{log_error, PhiError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

pub const METHODOLOGY: &str = "PR curve analysis, F2 optimization, recall floor";

/// Metrics of one category at one swept threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub f2: f64,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub meets_recall_floor: bool,
}

impl SweepRow {
    pub fn from_counts(threshold: f64, counts: OutcomeCounts, recall_floor: f64) -> Self {
        let metrics = counts.metrics();
        Self {
            threshold,
            precision: metrics.precision,
            recall: metrics.recall,
            f1: metrics.f1,
            f2: metrics.f2,
            counts,
            meets_recall_floor: metrics.recall >= recall_floor,
        }
    }
}

/// Row picked by [`select_threshold`]
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub row: SweepRow,
    /// No swept threshold met the recall floor
    pub below_floor: bool,
    /// Several rows were within the F2 tolerance of the best
    pub tie_broken: bool,
}

/// Pick a threshold from sweep rows.
///
/// Returns `None` only for an empty sweep. Rows are assumed to be in sweep
/// order; on equal recall the earlier row is kept.
pub fn select_threshold(rows: &[SweepRow], recall_floor: f64, f2_tolerance: f64) -> Option<Selection> {
    let first = rows.first()?;
    let eligible: Vec<&SweepRow> = rows.iter().filter(|r| r.recall >= recall_floor).collect();

    if eligible.is_empty() {
        let best = rows
            .iter()
            .fold(first, |best, row| if row.recall > best.recall { row } else { best });
        return Some(Selection {
            row: best.clone(),
            below_floor: true,
            tie_broken: false,
        });
    }

    let best_f2 = eligible.iter().map(|r| r.f2).fold(f64::NEG_INFINITY, f64::max);
    let ties: Vec<&SweepRow> = eligible
        .into_iter()
        .filter(|r| (r.f2 - best_f2).abs() < f2_tolerance || r.f2 == best_f2)
        .collect();
    let chosen = ties.iter().copied().reduce(|best, row| if row.recall > best.recall { row } else { best })?;

    Some(Selection {
        row: chosen.clone(),
        below_floor: false,
        tie_broken: ties.len() > 1,
    })
}

fn rationale(selection: &Selection, recall_floor: f64) -> String {
    let row = &selection.row;
    if selection.below_floor {
        return format!(
            "No threshold achieves {:.0}% recall floor. Using threshold {:.2} for maximum recall={:.1}%. Pattern improvements required.",
            recall_floor * 100.0,
            row.threshold,
            row.recall * 100.0
        );
    }
    let tie_note = if selection.tie_broken {
        " (tie-break: higher recall preferred)"
    } else {
        ""
    };
    format!(
        "Threshold {:.2} maximizes F2={:.1}% while maintaining recall>={:.0}%. Achieves P={:.1}%, R={:.1}%.{tie_note}",
        row.threshold,
        row.f2 * 100.0,
        recall_floor * 100.0,
        row.precision * 100.0,
        row.recall * 100.0
    )
}

/// Calibration outcome for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub category: String,
    pub chosen_threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub f2: f64,
    pub rationale: String,
    /// Recall floor unreachable at every swept threshold
    pub needs_improvement: bool,
    pub ground_truth_count: u64,
    pub sweep_rows: Vec<SweepRow>,
}

impl CalibrationResult {
    /// Build from a category's sweep.
    ///
    /// # Errors
    ///
    /// `Configuration` if `rows` is empty.
    pub fn from_sweep(
        category: &str,
        rows: Vec<SweepRow>,
        recall_floor: f64,
        f2_tolerance: f64,
    ) -> Result<Self> {
        let selection = select_threshold(&rows, recall_floor, f2_tolerance)
            .ok_or_else(|| PhiError::configuration("threshold sweep set is empty"))?;
        let ground_truth_count = rows.first().map_or(0, |r| r.counts.ground_truth());
        let row = &selection.row;
        Ok(Self {
            category: category.to_string(),
            chosen_threshold: row.threshold,
            precision: row.precision,
            recall: row.recall,
            f1: row.f1,
            f2: row.f2,
            rationale: rationale(&selection, recall_floor),
            needs_improvement: selection.below_floor,
            ground_truth_count,
            sweep_rows: rows,
        })
    }
}

/// Category left uncalibrated for lack of ground truth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCategory {
    pub category: String,
    pub found: u64,
    pub required: u64,
    pub note: String,
}

/// Precision/recall sample for curve plots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Everything needed to rerun a calibration and get the same table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproducibilityRecord {
    pub dataset_sha256: String,
    pub datasets: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub sweep_thresholds: Vec<f64>,
    pub recall_floor: f64,
    pub overlap_threshold: f64,
    pub f2_tie_tolerance: f64,
    pub min_ground_truth: u64,
    pub item_count: usize,
    pub excluded_count: usize,
    pub methodology: String,
}

/// Persisted output of one calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub results: Vec<CalibrationResult>,
    pub skipped: Vec<SkippedCategory>,
    pub pr_curves: BTreeMap<String, Vec<PrPoint>>,
    pub exclusions: Vec<Exclusion>,
    pub record: ReproducibilityRecord,
}

/// Threshold and metrics entry of the optimal-threshold document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalThreshold {
    pub optimal_threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub f2: f64,
    pub rationale: String,
}

/// Compact summary of chosen thresholds for review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalThresholdDocument {
    pub calibration_date: DateTime<Utc>,
    pub datasets: Vec<String>,
    pub dataset_sha256: String,
    pub methodology: String,
    pub thresholds: BTreeMap<String, OptimalThreshold>,
}

impl CalibrationReport {
    pub fn result(&self, category: &str) -> Option<&CalibrationResult> {
        self.results.iter().find(|r| r.category == category)
    }

    /// Chosen threshold per calibrated category
    pub fn optimal_thresholds(&self) -> BTreeMap<String, f64> {
        self.results
            .iter()
            .map(|r| (r.category.clone(), r.chosen_threshold))
            .collect()
    }

    /// `base` with calibrated categories overridden; other entries and the
    /// fallback are kept.
    pub fn threshold_table(&self, base: &ThresholdSettings) -> ThresholdSettings {
        let mut table = base.clone();
        table.per_category.extend(self.optimal_thresholds());
        table
    }

    /// `settings` with its threshold table replaced by the calibrated one
    pub fn apply_to(&self, settings: PhiSettings) -> PhiSettings {
        let table = self.threshold_table(&settings.thresholds);
        settings.with_thresholds(table.per_category)
    }

    /// Settings overlay that loads straight back as configuration.
    ///
    /// # Errors
    ///
    /// `Configuration` if rendering fails.
    pub fn threshold_overlay_yaml(&self, base: &ThresholdSettings) -> Result<String> {
        Ok(PhiSettings::threshold_overlay_yaml(&self.threshold_table(base))?)
    }

    pub fn optimal_document(&self) -> OptimalThresholdDocument {
        OptimalThresholdDocument {
            calibration_date: self.record.generated_at,
            datasets: self.record.datasets.clone(),
            dataset_sha256: self.record.dataset_sha256.clone(),
            methodology: format!(
                "{METHODOLOGY} >= {:.0}%",
                self.record.recall_floor * 100.0
            ),
            thresholds: self
                .results
                .iter()
                .map(|r| {
                    (
                        r.category.clone(),
                        OptimalThreshold {
                            optimal_threshold: r.chosen_threshold,
                            precision: r.precision,
                            recall: r.recall,
                            f1: r.f1,
                            f2: r.f2,
                            rationale: r.rationale.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Sweeps thresholds per category over a corpus
#[derive(Debug, Clone)]
pub struct ThresholdCalibrator {
    matcher: SpanMatcher,
    deny_lists: DenyListTable,
    f2_tolerance: f64,
    min_ground_truth: u64,
}

impl ThresholdCalibrator {
    pub fn new(
        matcher: SpanMatcher,
        deny_lists: DenyListTable,
        f2_tolerance: f64,
        min_ground_truth: u64,
    ) -> Self {
        Self {
            matcher,
            deny_lists,
            f2_tolerance,
            min_ground_truth,
        }
    }

    /// Calibrator using the settings' compatibility map, deny lists and
    /// calibration parameters.
    ///
    /// # Errors
    ///
    /// `Configuration` if a deny list fails to compile.
    pub fn from_settings(settings: &PhiSettings) -> Result<Self> {
        Ok(Self::new(
            SpanMatcher::from_settings(settings),
            DenyListTable::from_settings(&settings.deny_lists)?,
            settings.calibration.f2_tie_tolerance,
            settings.calibration.min_ground_truth as u64,
        ))
    }

    /// Counts for one ground-truth category at one threshold.
    ///
    /// Only candidates of a compatible category count, after the threshold
    /// and their own category's deny list.
    pub fn counts_at(&self, items: &[&CorpusItem], category: &str, threshold: f64) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for item in items {
            let ground_truth: Vec<_> = item
                .ground_truth
                .iter()
                .filter(|g| g.category == category)
                .cloned()
                .collect();
            let candidates: Vec<Candidate> = item
                .candidates
                .iter()
                .filter(|c| {
                    self.matcher.accepts(category, &c.category)
                        && c.score >= threshold
                        && !self.deny_lists.is_denied(&c.category, &c.source_text)
                })
                .cloned()
                .collect();
            let outcome = self.matcher.evaluate_item(&ground_truth, &candidates);
            counts.true_positives += outcome.matched.len() as u64;
            counts.false_negatives += outcome.missed.len() as u64;
            counts.false_positives += outcome.spurious.len() as u64;
        }
        counts
    }

    /// Sweep and select for every category present in the ground truth.
    ///
    /// Returns calibrated results, categories skipped for insufficient
    /// sample, and PR points per calibrated category.
    ///
    /// # Errors
    ///
    /// `Configuration` if `sweep` is empty or holds a value outside `[0, 1]`.
    pub fn calibrate(
        &self,
        items: &[&CorpusItem],
        sweep: &[f64],
        recall_floor: f64,
    ) -> Result<(Vec<CalibrationResult>, Vec<SkippedCategory>, BTreeMap<String, Vec<PrPoint>>)> {
        if sweep.is_empty() {
            return Err(PhiError::configuration("threshold sweep set is empty"));
        }
        if let Some(bad) = sweep.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(PhiError::configuration(format!(
                "swept threshold {bad} outside [0, 1]"
            )));
        }

        let mut ground_truth_counts: BTreeMap<&str, u64> = BTreeMap::new();
        for item in items {
            for expected in &item.ground_truth {
                *ground_truth_counts.entry(expected.category.as_str()).or_default() += 1;
            }
        }

        let mut skipped = Vec::new();
        let mut calibrated: BTreeSet<&str> = BTreeSet::new();
        for (&category, &found) in &ground_truth_counts {
            if found < self.min_ground_truth {
                let error = PhiError::InsufficientSample {
                    category: category.to_string(),
                    found: usize::try_from(found).unwrap_or(usize::MAX),
                    required: usize::try_from(self.min_ground_truth).unwrap_or(usize::MAX),
                };
                log_error("calibration", &error);
                skipped.push(SkippedCategory {
                    category: category.to_string(),
                    found,
                    required: self.min_ground_truth,
                    note: error.to_string(),
                });
            } else {
                calibrated.insert(category);
            }
        }

        let results = calibrated
            .par_iter()
            .map(|&category| {
                let rows = sweep
                    .iter()
                    .map(|&threshold| {
                        SweepRow::from_counts(
                            threshold,
                            self.counts_at(items, category, threshold),
                            recall_floor,
                        )
                    })
                    .collect();
                CalibrationResult::from_sweep(category, rows, recall_floor, self.f2_tolerance)
            })
            .collect::<Result<Vec<_>>>()?;

        let pr_curves = results
            .iter()
            .map(|r| {
                let points = r
                    .sweep_rows
                    .iter()
                    .map(|row| PrPoint {
                        threshold: row.threshold,
                        precision: row.precision,
                        recall: row.recall,
                    })
                    .collect();
                (r.category.clone(), points)
            })
            .collect();

        for result in &results {
            info!(
                category = %result.category,
                threshold = result.chosen_threshold,
                recall = result.recall,
                f2 = result.f2,
                needs_improvement = result.needs_improvement,
                "Category calibrated"
            );
        }

        Ok((results, skipped, pr_curves))
    }
}
