//! Offline accuracy validation for PHI redaction
//!
//! Given a labelled corpus with raw detector candidates per item, this crate
//! measures how well the production filter finds identifying spans and
//! decides whether a revision may ship:
//!
//! - [`SpanMatcher`] pairs ground truth with candidates by Jaccard overlap
//!   under a category-compatibility map.
//! - [`MetricsAggregator`] accumulates per-category counts and derives
//!   precision, recall, F1, F2 and two weighted variants.
//! - [`ConfidenceIntervalEstimator`] bootstraps percentile intervals.
//! - [`ThresholdCalibrator`] sweeps per-category thresholds.
//! - [`FailureClassifier`] buckets misses by remediation.
//! - [`ValidationOrchestrator`] ties these into evaluation, calibration and
//!   the deployment gate.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::PhiSettings;
//! use validation_engine::{report, Corpus, ValidationOrchestrator, Verdict};
//!
//! # fn run() -> error_common::Result<()> {
//! let corpus = Corpus::load(&["data/handoffs.json"])?;
//! let orchestrator = ValidationOrchestrator::new(PhiSettings::default())?;
//!
//! let evaluation = orchestrator.evaluate_corpus(&corpus.items)?;
//! let taxonomy = orchestrator.classify_failures(&evaluation);
//! let decision = orchestrator.decide(&evaluation);
//! println!("{}", report::compliance_report(&evaluation, &taxonomy, &decision));
//!
//! if decision.verdict == Verdict::Deploy {
//!     println!("ship it");
//! }
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod calibration;
pub mod corpus;
pub mod matching;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod taxonomy;

pub use bootstrap::{ConfidenceInterval, ConfidenceIntervalEstimator, Metric, Trials};
pub use calibration::{
    select_threshold, CalibrationReport, CalibrationResult, OptimalThresholdDocument, PrPoint,
    ReproducibilityRecord, Selection, SkippedCategory, SweepRow, ThresholdCalibrator,
};
pub use corpus::{check_exclusion_limit, fingerprint, partition, Corpus, CorpusItem, Exclusion};
pub use matching::{overlap, ItemOutcome, MatchedPair, SpanMatcher};
pub use metrics::{f_beta, MetricGate, MetricSet, MetricsAggregator, OutcomeCounts};
pub use orchestrator::{
    DeploymentDecision, EvaluationOutput, ValidationOrchestrator, Verdict, WeightComparison,
};
pub use taxonomy::{FailureBucket, FailureCase, FailureClassifier, FailureMode, TaxonomyReport};
