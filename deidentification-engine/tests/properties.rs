use async_trait::async_trait;
use config_engine::PhiSettings;
use deidentification_engine::{
    Candidate, CandidateFilter, DeidentificationService, PhiDetector, ReplacementStrategy, Span,
    TransferFacilityMode,
};
use error_common::Result;
use proptest::prelude::*;
use std::sync::Arc;

const NAMES: [&str; 4] = ["Jessica", "Mike", "Rosa", "Patel"];
const FILLER: [&str; 8] = ["mom", "is", "at", "bedside", "stable", "on", "room", "air"];
const SURFACES: [&str; 8] = ["Jessica", "mom", "dad", "on RA", "Rapid City", "5 months old", "March 3", "12"];
const CATEGORIES: [&str; 5] = ["PERSON", "GUARDIAN_NAME", "LOCATION", "DATE_TIME", "ROOM"];

/// Exhaustive detector over a closed name vocabulary
struct NameDetector;

#[async_trait]
impl PhiDetector for NameDetector {
    async fn text_to_candidates(&self, text: &str, _categories: &[String]) -> Result<Vec<Candidate>> {
        let mut found = Vec::new();
        for name in NAMES {
            for (start, _) in text.match_indices(name) {
                found.push(Candidate::from_text(
                    text,
                    "PERSON",
                    Span::new(start, start + name.len()),
                    0.9,
                )?);
            }
        }
        Ok(found)
    }
}

fn candidate_strategy() -> impl Strategy<Value = Candidate> {
    (0..CATEGORIES.len(), 0..SURFACES.len(), 0.0f64..=1.0).prop_map(|(c, s, score)| {
        let surface = SURFACES[s];
        Candidate {
            category: CATEGORIES[c].to_string(),
            span: Span::new(0, surface.len()),
            score,
            source_text: surface.to_string(),
        }
    })
}

fn strategy_strategy() -> impl Strategy<Value = ReplacementStrategy> {
    prop_oneof![
        Just(ReplacementStrategy::TypeMarker),
        Just(ReplacementStrategy::FixedMarker),
        Just(ReplacementStrategy::MaskCharacters),
    ]
}

proptest! {
    #[test]
    fn survivors_meet_threshold_and_escape_deny_lists(
        candidates in prop::collection::vec(candidate_strategy(), 0..24)
    ) {
        let filter = CandidateFilter::from_settings(&PhiSettings::default()).unwrap();
        let survivors = filter.filter(candidates.clone());

        for survivor in &survivors {
            prop_assert!(survivor.score >= filter.threshold_for(&survivor.category));
            prop_assert!(!filter.deny_lists().is_denied(&survivor.category, &survivor.source_text));
        }

        // order preserved
        let expected: Vec<&Candidate> = candidates.iter().filter(|c| filter.admits(c)).collect();
        prop_assert_eq!(survivors.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn redaction_after_exhaustive_detection_is_safe(
        words in prop::collection::vec((any::<bool>(), 0usize..8), 1..20),
        strategy in strategy_strategy(),
    ) {
        let text = words
            .iter()
            .map(|(is_name, i)| if *is_name { NAMES[i % NAMES.len()] } else { FILLER[*i] })
            .collect::<Vec<_>>()
            .join(" ");

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let service =
            DeidentificationService::with_detector(PhiSettings::default(), Arc::new(NameDetector)).unwrap();
        let outcome = runtime
            .block_on(service.redact(&text, strategy, TransferFacilityMode::Conservative))
            .unwrap();

        prop_assert!(outcome.is_safe, "warnings: {:?}", outcome.warnings);
        for name in NAMES {
            prop_assert!(!outcome.redacted_text.contains(name));
        }
    }
}
