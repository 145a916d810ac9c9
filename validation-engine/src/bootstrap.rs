// Percentile bootstrap over per-instance detection outcomes
use crate::metrics::{precision_from, recall_from, OutcomeCounts};
use config_engine::EvaluationSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which ratio a confidence interval is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Recall,
    Precision,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Recall => write!(f, "recall"),
            Metric::Precision => write!(f, "precision"),
        }
    }
}

/// Every tp/fn/fp instance as one independent trial.
///
/// A true positive is `(actual, predicted) = (true, true)`, a false negative
/// `(true, false)` and a false positive `(false, true)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trials {
    pub actual: Vec<bool>,
    pub predicted: Vec<bool>,
}

impl Trials {
    pub fn from_counts(counts: &OutcomeCounts) -> Self {
        let mut trials = Self::default();
        trials.push(true, true, counts.true_positives);
        trials.push(true, false, counts.false_negatives);
        trials.push(false, true, counts.false_positives);
        trials
    }

    fn push(&mut self, actual: bool, predicted: bool, count: u64) {
        for _ in 0..count {
            self.actual.push(actual);
            self.predicted.push(predicted);
        }
    }

    pub fn len(&self) -> usize {
        self.actual.len().min(self.predicted.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn metric_over(&self, metric: Metric, indices: impl Iterator<Item = usize>) -> f64 {
        let (mut tp, mut fn_, mut fp) = (0u64, 0u64, 0u64);
        for index in indices {
            match (self.actual.get(index), self.predicted.get(index)) {
                (Some(true), Some(true)) => tp += 1,
                (Some(true), Some(false)) => fn_ += 1,
                (Some(false), Some(true)) => fp += 1,
                _ => {}
            }
        }
        match metric {
            Metric::Recall => recall_from(tp as f64, fn_ as f64),
            Metric::Precision => precision_from(tp as f64, fp as f64),
        }
    }

    /// Metric over the observed trials
    pub fn observed(&self, metric: Metric) -> f64 {
        self.metric_over(metric, 0..self.len())
    }
}

/// Point estimate with percentile bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub metric: Metric,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    pub confidence_level: f64,
    pub iterations: usize,
    pub sample_size: usize,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.1}% ({:.0}% CI: {:.1}%-{:.1}%)",
            self.metric,
            self.point * 100.0,
            self.confidence_level * 100.0,
            self.lower * 100.0,
            self.upper * 100.0
        )
    }
}

/// Linear-interpolated percentile of sorted values, `q` in `[0, 1]`
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };
    let position = q.clamp(0.0, 1.0) * last as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (low, high) = (position.floor() as usize, position.ceil() as usize);
    match (sorted.get(low), sorted.get(high)) {
        (Some(a), Some(b)) => a + (b - a) * (position - low as f64),
        _ => 0.0,
    }
}

/// Seeded percentile bootstrap.
///
/// Resample `i` draws from its own generator seeded with `seed + i`, so the
/// result does not depend on how rayon schedules the resamples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceIntervalEstimator {
    iterations: usize,
    confidence_level: f64,
    seed: u64,
}

impl ConfidenceIntervalEstimator {
    pub fn new(iterations: usize, confidence_level: f64, seed: u64) -> Self {
        Self {
            iterations,
            confidence_level,
            seed,
        }
    }

    pub fn from_settings(settings: &EvaluationSettings) -> Self {
        Self::new(
            settings.bootstrap_iterations,
            settings.confidence_level,
            settings.bootstrap_seed,
        )
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Bootstrap `metric` over `trials`.
    ///
    /// The point estimate is the metric over the observed trials; the bounds
    /// are widened to contain it when the resampled distribution is skewed
    /// away from it.
    pub fn estimate(&self, trials: &Trials, metric: Metric) -> ConfidenceInterval {
        let point = trials.observed(metric);
        let n = trials.len();
        if n == 0 || self.iterations == 0 {
            return ConfidenceInterval {
                metric,
                point,
                lower: point,
                upper: point,
                confidence_level: self.confidence_level,
                iterations: 0,
                sample_size: n,
            };
        }

        let mut resampled: Vec<f64> = (0..self.iterations)
            .into_par_iter()
            .map(|iteration| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(iteration as u64));
                trials.metric_over(metric, (0..n).map(|_| rng.gen_range(0..n)))
            })
            .collect();
        resampled.sort_by(f64::total_cmp);

        let alpha = 1.0 - self.confidence_level;
        let lower = percentile(&resampled, alpha / 2.0).min(point);
        let upper = percentile(&resampled, 1.0 - alpha / 2.0).max(point);

        ConfidenceInterval {
            metric,
            point,
            lower,
            upper,
            confidence_level: self.confidence_level,
            iterations: self.iterations,
            sample_size: n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trials_from_counts() {
        let trials = Trials::from_counts(&OutcomeCounts::new(2, 1, 1));
        assert_eq!(trials.actual, vec![true, true, true, false]);
        assert_eq!(trials.predicted, vec![true, true, false, true]);
        assert_eq!(trials.observed(Metric::Recall), 2.0 / 3.0);
        assert_eq!(trials.observed(Metric::Precision), 2.0 / 3.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.5), 2.0);
        assert_eq!(percentile(&sorted, 0.125), 0.5);
        assert_eq!(percentile(&sorted, 1.0), 4.0);
    }

    #[test]
    fn test_same_seed_same_interval() {
        let trials = Trials::from_counts(&OutcomeCounts::new(90, 10, 20));
        let estimator = ConfidenceIntervalEstimator::new(500, 0.95, 42);
        let first = estimator.estimate(&trials, Metric::Recall);
        let second = estimator.estimate(&trials, Metric::Recall);
        assert_eq!(first, second);
        assert!(first.lower <= first.point && first.point <= first.upper);
        assert!(first.lower > 0.8 && first.upper < 0.97);
    }

    #[test]
    fn test_perfect_recall_has_zero_width() {
        let trials = Trials::from_counts(&OutcomeCounts::new(50, 0, 5));
        let interval = ConfidenceIntervalEstimator::new(200, 0.95, 7).estimate(&trials, Metric::Recall);
        assert_eq!(interval.point, 1.0);
        assert_eq!(interval.lower, 1.0);
        assert_eq!(interval.width(), 0.0);
    }

    #[test]
    fn test_empty_trials() {
        let interval = ConfidenceIntervalEstimator::new(100, 0.95, 1)
            .estimate(&Trials::default(), Metric::Precision);
        assert_eq!(interval.point, 0.0);
        assert_eq!(interval.lower, interval.upper);
        assert_eq!(interval.iterations, 0);
    }
}
