// Load-time validation of the threshold, deny-list and weight tables
use crate::error::{ConfigError, Result};
use crate::settings::PhiSettings;
use regex::Regex;
use std::collections::BTreeMap;

fn check_unit(problems: &mut Vec<String>, name: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        problems.push(format!("{name} must be within [0, 1], got {value}"));
    }
}

fn check_weights(problems: &mut Vec<String>, name: &str, weights: &BTreeMap<String, f64>) {
    for (category, weight) in weights {
        if !weight.is_finite() || *weight < 0.0 {
            problems.push(format!(
                "{name}.{category} must be a non-negative number, got {weight}"
            ));
        }
    }
}

impl PhiSettings {
    /// Reject tables that would make filtering or metrics meaningless.
    ///
    /// All problems are collected so one failed start reports every bad
    /// entry at once.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] listing each problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        check_unit(
            &mut problems,
            "thresholds.default_threshold",
            self.thresholds.default_threshold,
        );
        for (category, threshold) in &self.thresholds.per_category {
            check_unit(
                &mut problems,
                &format!("thresholds.per_category.{category}"),
                *threshold,
            );
        }

        for (category, list) in &self.deny_lists {
            if list.terms.iter().any(|term| term.trim().is_empty()) {
                problems.push(format!("deny_lists.{category} contains an empty term"));
            }
        }

        for (category, accepted) in &self.compatibility {
            if accepted.is_empty() {
                problems.push(format!(
                    "compatibility.{category} must accept at least one category"
                ));
            }
        }

        check_weights(&mut problems, "frequency_weights", &self.frequency_weights);
        check_weights(&mut problems, "risk_weights", &self.risk_weights);

        if self.redaction.transfer_facility_category.trim().is_empty() {
            problems.push("redaction.transfer_facility_category must not be empty".to_string());
        }
        if self.redaction.detector_timeout_ms == 0 {
            problems.push("redaction.detector_timeout_ms must be positive".to_string());
        }

        for pattern in &self.recognizers.mrn_patterns {
            if let Err(e) = Regex::new(pattern) {
                problems.push(format!("recognizers.mrn_patterns entry is invalid: {e}"));
            }
        }

        let evaluation = &self.evaluation;
        check_unit(&mut problems, "evaluation.overlap_threshold", evaluation.overlap_threshold);
        check_unit(&mut problems, "evaluation.deploy_threshold", evaluation.deploy_threshold);
        if evaluation.bootstrap_iterations == 0 {
            problems.push("evaluation.bootstrap_iterations must be positive".to_string());
        }
        if !(evaluation.confidence_level > 0.0 && evaluation.confidence_level < 1.0) {
            problems.push(format!(
                "evaluation.confidence_level must be within (0, 1), got {}",
                evaluation.confidence_level
            ));
        }

        let calibration = &self.calibration;
        if calibration.sweep_thresholds.is_empty() {
            problems.push("calibration.sweep_thresholds must not be empty".to_string());
        }
        for threshold in &calibration.sweep_thresholds {
            check_unit(&mut problems, "calibration.sweep_thresholds entry", *threshold);
        }
        check_unit(&mut problems, "calibration.recall_floor", calibration.recall_floor);
        check_unit(
            &mut problems,
            "calibration.max_exclusion_ratio",
            calibration.max_exclusion_ratio,
        );
        if calibration.f2_tie_tolerance < 0.0 {
            problems.push("calibration.f2_tie_tolerance must not be negative".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            tracing::error!(problem_count = problems.len(), "Settings validation failed");
            Err(ConfigError::Validation(problems))
        }
    }
}
