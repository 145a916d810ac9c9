use crate::detector::PhiDetector;
use crate::filter::CandidateFilter;
use crate::models::Candidate;
use crate::redaction::{type_marker, FIXED_MARKER};
use error_common::Result;
use logger_redacted::PiiRedactor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of re-detecting on redacted output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakReport {
    pub is_safe: bool,
    pub warnings: Vec<String>,
}

/// Every marker the redaction engine can write
pub fn known_markers(categories: &[String]) -> BTreeSet<String> {
    let mut markers: BTreeSet<String> = categories.iter().map(|c| type_marker(c)).collect();
    markers.insert(FIXED_MARKER.to_string());
    markers
}

fn is_marker(surface: &str, markers: &BTreeSet<String>) -> bool {
    let trimmed = surface.trim();
    markers.contains(trimmed) || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

/// Independent second pass over redacted text.
///
/// Uses the same detector and filter snapshot as the redaction it checks, so
/// a residual candidate means the first pass missed it or substitution
/// shifted a boundary.
pub struct LeakValidator {
    detector: Arc<dyn PhiDetector>,
    filter: Arc<CandidateFilter>,
    categories: Vec<String>,
    /// Categories deliberately left readable for this request
    exempt: BTreeSet<String>,
}

impl LeakValidator {
    pub fn new(
        detector: Arc<dyn PhiDetector>,
        filter: Arc<CandidateFilter>,
        categories: Vec<String>,
    ) -> Self {
        Self {
            detector,
            filter,
            categories,
            exempt: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_exempt_category(mut self, category: impl Into<String>) -> Self {
        self.exempt.insert(category.into());
        self
    }

    fn warning(&self, candidate: &Candidate) -> String {
        format!(
            "Potential PHI leak: {} (score: {:.2}, threshold: {:.2}) at position {}-{}",
            candidate.category,
            candidate.score,
            self.filter.threshold_for(&candidate.category),
            candidate.span.start,
            candidate.span.end
        )
    }

    /// Re-detect on `redacted` and report survivors that are not markers.
    ///
    /// `applied_markers` are the markers written by the redaction being
    /// checked; the full known marker set is always ignored as well.
    ///
    /// # Errors
    ///
    /// Propagates detector failures; the caller must treat them as unsafe.
    pub async fn validate(
        &self,
        original: &str,
        redacted: &str,
        applied_markers: &BTreeSet<String>,
    ) -> Result<LeakReport> {
        let mut markers = known_markers(&self.categories);
        markers.extend(applied_markers.iter().cloned());

        let candidates = self
            .detector
            .text_to_candidates(redacted, &self.categories)
            .await?;

        let warnings: Vec<String> = self
            .filter
            .filter(candidates)
            .iter()
            .filter(|c| !self.exempt.contains(&c.category))
            .filter(|c| !is_marker(&c.source_text, &markers))
            .map(|c| self.warning(c))
            .collect();

        if !warnings.is_empty() {
            tracing::warn!(
                text_id = %PiiRedactor::default().fingerprint(original),
                leak_count = warnings.len(),
                "Validation found potential PHI leaks"
            );
        }

        Ok(LeakReport {
            is_safe: warnings.is_empty(),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{CompositeDetector, PatternRecognizer, PatternRule};
    use config_engine::PhiSettings;

    fn validator(detector: CompositeDetector) -> LeakValidator {
        let settings = PhiSettings::default();
        LeakValidator::new(
            Arc::new(detector),
            Arc::new(CandidateFilter::from_settings(&settings).unwrap()),
            settings.phi_entities.clone(),
        )
    }

    fn bracket_detector() -> CompositeDetector {
        let detector = CompositeDetector::new();
        detector.register(Arc::new(
            PatternRecognizer::new(
                "Bracket echo",
                "PERSON",
                vec![PatternRule::new("bracketed", r"\[[A-Z]+\]", 0.9).unwrap()],
            ),
        ));
        detector
    }

    #[tokio::test]
    async fn test_markers_are_not_leaks() {
        let report = validator(bracket_detector())
            .validate("Mom Jessica", "Mom [NAME]", &BTreeSet::new())
            .await
            .unwrap();
        assert!(report.is_safe);
    }

    #[tokio::test]
    async fn test_residual_candidate_is_reported_without_text() {
        let detector = CompositeDetector::new();
        detector.register(Arc::new(PatternRecognizer::new(
            "Names",
            "PERSON",
            vec![PatternRule::new("jessica", r"\bJessica\b", 0.9).unwrap()],
        )));
        let report = validator(detector)
            .validate("Mom Jessica, Jessica", "Mom [NAME], Jessica", &BTreeSet::new())
            .await
            .unwrap();
        assert!(!report.is_safe);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("PERSON"));
        assert!(!report.warnings[0].contains("Jessica"));
    }

    #[tokio::test]
    async fn test_exempt_category_is_ignored() {
        let detector = CompositeDetector::new();
        detector.register(Arc::new(PatternRecognizer::new(
            "Facilities",
            "LOCATION",
            vec![PatternRule::new("mercy", r"Mercy General", 0.7).unwrap()],
        )));
        let report = validator(detector)
            .with_exempt_category("LOCATION")
            .validate("from Mercy General", "from Mercy General", &BTreeSet::new())
            .await
            .unwrap();
        assert!(report.is_safe);
    }
}
