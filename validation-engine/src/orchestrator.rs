use crate::bootstrap::{ConfidenceInterval, ConfidenceIntervalEstimator, Metric, Trials};
use crate::calibration::{CalibrationReport, ReproducibilityRecord, ThresholdCalibrator, METHODOLOGY};
use crate::corpus::{
    check_exclusion_limit, fingerprint, partition, Corpus, CorpusItem, Exclusion, IN_MEMORY_SOURCE,
};
use crate::matching::SpanMatcher;
use crate::metrics::{MetricGate, MetricSet, MetricsAggregator, OutcomeCounts};
use crate::taxonomy::{FailureCase, FailureClassifier, TaxonomyReport};
use chrono::{DateTime, Utc};
use config_engine::PhiSettings;
use deidentification_engine::{CandidateFilter, DenyListTable};
use error_common::{log_error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::info;

/// Frequency and risk weights differing by more than this are reported
const WEIGHT_DIVERGENCE: f64 = 2.0;

/// Where the two weightings disagree about a category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightComparison {
    /// `(category, frequency weight, risk weight)`
    pub divergent: Vec<(String, f64, f64)>,
    pub zero_frequency: Vec<String>,
    pub zero_risk: Vec<String>,
}

impl WeightComparison {
    pub fn compare(frequency: &BTreeMap<String, f64>, risk: &BTreeMap<String, f64>) -> Self {
        let categories: BTreeSet<&String> = frequency.keys().chain(risk.keys()).collect();
        let mut comparison = Self::default();
        for category in categories {
            let f = frequency.get(category).copied().unwrap_or(0.0);
            let r = risk.get(category).copied().unwrap_or(0.0);
            if (f - r).abs() > WEIGHT_DIVERGENCE {
                comparison.divergent.push((category.clone(), f, r));
            }
            if f == 0.0 {
                comparison.zero_frequency.push(category.clone());
            }
            if r == 0.0 {
                comparison.zero_risk.push(category.clone());
            }
        }
        comparison
    }
}

/// Persisted output of one corpus evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutput {
    pub generated_at: DateTime<Utc>,
    pub dataset_sha256: String,
    pub item_count: usize,
    pub evaluated_items: usize,
    pub exclusions: Vec<Exclusion>,
    pub counts: BTreeMap<String, OutcomeCounts>,
    pub totals: OutcomeCounts,
    pub overall: MetricSet,
    pub per_category: BTreeMap<String, MetricSet>,
    pub frequency_weighted: MetricSet,
    pub risk_weighted: MetricSet,
    pub recall_ci: ConfidenceInterval,
    pub precision_ci: ConfidenceInterval,
    pub weight_comparison: WeightComparison,
    /// Unmet minimums of the default metric gate
    pub gate_failures: Vec<String>,
    pub failures: Vec<FailureCase>,
}

/// Go/no-go outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Deploy,
    ReturnForImprovement,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Deploy => f.write_str("DEPLOY"),
            Verdict::ReturnForImprovement => f.write_str("RETURN_FOR_IMPROVEMENT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDecision {
    pub verdict: Verdict,
    pub recall_lower_bound: f64,
    pub deploy_threshold: f64,
    pub reasoning: String,
}

/// Runs corpus evaluation, calibration, failure classification and the
/// deployment gate with one set of settings.
pub struct ValidationOrchestrator {
    settings: PhiSettings,
    filter: CandidateFilter,
    matcher: SpanMatcher,
    estimator: ConfidenceIntervalEstimator,
    calibrator: ThresholdCalibrator,
    classifier: FailureClassifier,
    gate: MetricGate,
}

impl ValidationOrchestrator {
    /// # Errors
    ///
    /// `Configuration` if the deny lists fail to compile.
    pub fn new(settings: PhiSettings) -> Result<Self> {
        let matcher = SpanMatcher::from_settings(&settings);
        Ok(Self {
            filter: CandidateFilter::from_settings(&settings)?,
            estimator: ConfidenceIntervalEstimator::from_settings(&settings.evaluation),
            calibrator: ThresholdCalibrator::from_settings(&settings)?,
            classifier: FailureClassifier::new(
                matcher.clone(),
                DenyListTable::from_settings(&settings.deny_lists)?,
            ),
            matcher,
            gate: MetricGate::default(),
            settings,
        })
    }

    /// Track known surface forms so unseen ones classify as novel variants
    #[must_use]
    pub fn with_known_patterns(mut self, patterns: BTreeMap<String, Vec<String>>) -> Self {
        self.classifier = self.classifier.with_known_patterns(patterns);
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: MetricGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn settings(&self) -> &PhiSettings {
        &self.settings
    }

    /// Items fit for calibration; too many exclusions would bias the sweep
    fn calibration_items<'a>(
        &self,
        items: &'a [CorpusItem],
    ) -> Result<(Vec<&'a CorpusItem>, Vec<Exclusion>)> {
        let (usable, excluded) = partition(items);
        check_exclusion_limit(
            excluded.len(),
            items.len(),
            self.settings.calibration.max_exclusion_ratio,
        )
        .inspect_err(|e| log_error("corpus", e))?;
        Ok((usable, excluded))
    }

    /// Match filtered candidates against ground truth over the corpus.
    ///
    /// Items that fail integrity checks are excluded and listed in the
    /// output; the rest are still evaluated.
    ///
    /// # Errors
    ///
    /// `Serialization` if the corpus cannot be fingerprinted.
    pub fn evaluate_corpus(&self, items: &[CorpusItem]) -> Result<EvaluationOutput> {
        let dataset_sha256 = fingerprint(items)?;
        let (usable, exclusions) = partition(items);

        let passes: Vec<(MetricsAggregator, Vec<FailureCase>)> = usable
            .par_iter()
            .map(|item| {
                let survivors = self.filter.filter(item.candidates.clone());
                let outcome = self.matcher.evaluate_item(&item.ground_truth, &survivors);
                let failures = outcome
                    .missed
                    .iter()
                    .map(|missed| {
                        self.classifier
                            .classify(&item.id, &item.text, missed, &item.candidates)
                    })
                    .collect();
                let mut aggregator = MetricsAggregator::new();
                aggregator.add_item(&outcome);
                (aggregator, failures)
            })
            .collect();

        let mut aggregator = MetricsAggregator::new();
        let mut failures = Vec::new();
        for (pass, missed) in passes {
            aggregator = aggregator.merge(pass);
            failures.extend(missed);
        }

        let totals = aggregator.totals();
        let trials = Trials::from_counts(&totals);
        let overall = aggregator.overall();
        let output = EvaluationOutput {
            generated_at: Utc::now(),
            dataset_sha256,
            item_count: items.len(),
            evaluated_items: usable.len(),
            exclusions,
            counts: aggregator.counts().clone(),
            totals,
            overall,
            per_category: aggregator.per_category(),
            frequency_weighted: aggregator.weighted(&self.settings.frequency_weights),
            risk_weighted: aggregator.weighted(&self.settings.risk_weights),
            recall_ci: self.estimator.estimate(&trials, Metric::Recall),
            precision_ci: self.estimator.estimate(&trials, Metric::Precision),
            weight_comparison: WeightComparison::compare(
                &self.settings.frequency_weights,
                &self.settings.risk_weights,
            ),
            gate_failures: self.gate.check(&overall),
            failures,
        };

        info!(
            items = output.item_count,
            evaluated = output.evaluated_items,
            excluded = output.exclusions.len(),
            recall = output.overall.recall,
            recall_lower = output.recall_ci.lower,
            precision = output.overall.precision,
            "Corpus evaluated"
        );
        Ok(output)
    }

    /// Sweep per-category thresholds and pick one per category.
    ///
    /// # Errors
    ///
    /// `ExclusionLimitExceeded` when too many items are unusable;
    /// `Configuration` on an empty or out-of-range sweep.
    pub fn calibrate(
        &self,
        items: &[CorpusItem],
        thresholds_to_sweep: &[f64],
        recall_floor: f64,
    ) -> Result<CalibrationReport> {
        let sources = [IN_MEMORY_SOURCE.to_string()];
        self.calibrate_items(items, &sources, fingerprint(items)?, thresholds_to_sweep, recall_floor)
    }

    /// [`Self::calibrate`] over a loaded corpus, recording its source files
    ///
    /// # Errors
    ///
    /// See [`Self::calibrate`].
    pub fn calibrate_corpus(
        &self,
        corpus: &Corpus,
        thresholds_to_sweep: &[f64],
        recall_floor: f64,
    ) -> Result<CalibrationReport> {
        self.calibrate_items(
            &corpus.items,
            &corpus.sources,
            corpus.sha256.clone(),
            thresholds_to_sweep,
            recall_floor,
        )
    }

    fn calibrate_items(
        &self,
        items: &[CorpusItem],
        sources: &[String],
        dataset_sha256: String,
        thresholds_to_sweep: &[f64],
        recall_floor: f64,
    ) -> Result<CalibrationReport> {
        let (usable, exclusions) = self.calibration_items(items)?;
        let (results, skipped, pr_curves) =
            self.calibrator.calibrate(&usable, thresholds_to_sweep, recall_floor)?;

        let calibration = &self.settings.calibration;
        let record = ReproducibilityRecord {
            dataset_sha256,
            datasets: sources.to_vec(),
            generated_at: Utc::now(),
            seed: self.settings.evaluation.bootstrap_seed,
            sweep_thresholds: thresholds_to_sweep.to_vec(),
            recall_floor,
            overlap_threshold: self.matcher.overlap_threshold(),
            f2_tie_tolerance: calibration.f2_tie_tolerance,
            min_ground_truth: calibration.min_ground_truth as u64,
            item_count: items.len(),
            excluded_count: exclusions.len(),
            methodology: METHODOLOGY.to_string(),
        };
        info!(
            calibrated = results.len(),
            skipped = skipped.len(),
            dataset = %record.dataset_sha256,
            "Calibration complete"
        );

        Ok(CalibrationReport {
            results,
            skipped,
            pr_curves,
            exclusions,
            record,
        })
    }

    /// Group an evaluation's false negatives by failure mode
    pub fn classify_failures(&self, evaluation: &EvaluationOutput) -> TaxonomyReport {
        TaxonomyReport::from_cases(&evaluation.failures)
    }

    /// Deploy iff the recall interval's lower bound reaches the safety threshold
    pub fn decide(&self, evaluation: &EvaluationOutput) -> DeploymentDecision {
        let threshold = self.settings.evaluation.deploy_threshold;
        let ci = &evaluation.recall_ci;
        let (verdict, relation) = if ci.lower >= threshold {
            (Verdict::Deploy, "meets")
        } else {
            (Verdict::ReturnForImprovement, "is below")
        };

        let reasoning = format!(
            "Recall {:.0}% CI lower bound {:.1}% {relation} the {:.1}% safety threshold (point estimate {:.1}%, {} ground-truth spans, {} bootstrap resamples).",
            ci.confidence_level * 100.0,
            ci.lower * 100.0,
            threshold * 100.0,
            ci.point * 100.0,
            evaluation.totals.ground_truth(),
            ci.iterations
        );
        info!(verdict = %verdict, recall_lower = ci.lower, threshold, "Deployment decision");

        DeploymentDecision {
            verdict,
            recall_lower_bound: ci.lower,
            deploy_threshold: threshold,
            reasoning,
        }
    }
}
