use async_trait::async_trait;
use config_engine::PhiSettings;
use deidentification_engine::{
    Candidate, CandidateFilter, DeidentificationService, PhiDetector, ReplacementStrategy,
    SpanAction, Span, TransferFacilityMode,
};
use error_common::{PhiError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reports every occurrence of fixed surface strings
struct FixedDetector {
    entries: Vec<(&'static str, &'static str, f64)>,
}

#[async_trait]
impl PhiDetector for FixedDetector {
    async fn text_to_candidates(&self, text: &str, _categories: &[String]) -> Result<Vec<Candidate>> {
        let mut found = Vec::new();
        for (category, needle, score) in &self.entries {
            for (start, _) in text.match_indices(needle) {
                found.push(Candidate::from_text(
                    text,
                    *category,
                    Span::new(start, start + needle.len()),
                    *score,
                )?);
            }
        }
        Ok(found)
    }
}

struct FailingDetector;

#[async_trait]
impl PhiDetector for FailingDetector {
    async fn text_to_candidates(&self, _text: &str, _categories: &[String]) -> Result<Vec<Candidate>> {
        Err(PhiError::configuration("backend crashed while reading 555-867-5309"))
    }
}

struct SlowDetector;

#[async_trait]
impl PhiDetector for SlowDetector {
    async fn text_to_candidates(&self, _text: &str, _categories: &[String]) -> Result<Vec<Candidate>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(Vec::new())
    }
}

struct OutOfBoundsDetector;

#[async_trait]
impl PhiDetector for OutOfBoundsDetector {
    async fn text_to_candidates(&self, _text: &str, _categories: &[String]) -> Result<Vec<Candidate>> {
        Ok(vec![Candidate {
            category: "PERSON".to_string(),
            span: Span::new(4, 400),
            score: 0.9,
            source_text: "Jessica".to_string(),
        }])
    }
}

fn service_with(detector: impl PhiDetector + 'static) -> DeidentificationService {
    DeidentificationService::with_detector(PhiSettings::default(), Arc::new(detector)).unwrap()
}

#[tokio::test]
async fn test_redacts_guardian_name_and_keeps_context() {
    let service = service_with(FixedDetector {
        entries: vec![("PERSON", "Jessica", 0.9)],
    });

    let outcome = service
        .redact(
            "Mom Jessica is at bedside.",
            ReplacementStrategy::TypeMarker,
            TransferFacilityMode::Conservative,
        )
        .await
        .unwrap();

    assert_eq!(outcome.redacted_text, "Mom [NAME] is at bedside.");
    assert!(outcome.redacted_text.starts_with("Mom "));
    assert!(outcome.redacted_text.contains("bedside"));
    assert!(outcome.is_safe);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.applied_spans.len(), 1);
    assert_eq!(outcome.applied_spans[0].masked_preview, "Jes*ica");
    assert_eq!(outcome.entity_counts.get("PERSON"), Some(&1));
}

#[tokio::test]
async fn test_builtin_detector_end_to_end() {
    let service = DeidentificationService::new(PhiSettings::default()).unwrap();
    assert!(!service.is_detector_loaded());

    let outcome = service
        .redact(
            "Mom Jessica is at bedside in room 12, call 555-867-5309.",
            ReplacementStrategy::TypeMarker,
            TransferFacilityMode::Conservative,
        )
        .await
        .unwrap();

    assert!(service.is_detector_loaded());
    assert!(!outcome.redacted_text.contains("Jessica"));
    assert!(!outcome.redacted_text.contains("555-867-5309"));
    assert!(outcome.redacted_text.contains("[NAME]"));
    assert!(outcome.redacted_text.contains("[ROOM]"));
    assert!(outcome.is_safe, "warnings: {:?}", outcome.warnings);
}

#[tokio::test]
async fn test_deny_listed_candidates_survive_unredacted() {
    let service = service_with(FixedDetector {
        entries: vec![("PERSON", "Mom", 0.9), ("DATE_TIME", "5 months old", 0.8)],
    });

    let outcome = service
        .redact(
            "Mom says he is 5 months old.",
            ReplacementStrategy::TypeMarker,
            TransferFacilityMode::Conservative,
        )
        .await
        .unwrap();

    assert_eq!(outcome.redacted_text, "Mom says he is 5 months old.");
    assert!(outcome.applied_spans.is_empty());
}

#[tokio::test]
async fn test_clinical_mode_preserves_facility() {
    let service = service_with(FixedDetector {
        entries: vec![("LOCATION", "Mercy General", 0.7), ("GUARDIAN_NAME", "Mike", 0.85)],
    });
    let text = "Transfer from Mercy General, dad Mike aware.";

    let clinical = service
        .redact(text, ReplacementStrategy::TypeMarker, TransferFacilityMode::Clinical)
        .await
        .unwrap();
    assert_eq!(clinical.redacted_text, "Transfer from Mercy General, dad [NAME] aware.");
    assert!(clinical.is_safe);
    assert_eq!(clinical.applied_spans[0].action, SpanAction::Preserved);

    let conservative = service
        .redact(text, ReplacementStrategy::TypeMarker, TransferFacilityMode::Conservative)
        .await
        .unwrap();
    assert_eq!(conservative.redacted_text, "Transfer from [LOCATION], dad [NAME] aware.");
}

#[tokio::test]
async fn test_detector_error_fails_closed_without_phi() {
    let service = service_with(FailingDetector);
    let err = service
        .redact("Mom Jessica", ReplacementStrategy::TypeMarker, TransferFacilityMode::Conservative)
        .await
        .unwrap_err();

    assert!(matches!(err, PhiError::DetectorUnavailable(_)));
    assert!(!err.to_string().contains("555-867-5309"));
}

#[tokio::test]
async fn test_detector_timeout_fails_closed() {
    let mut settings = PhiSettings::default();
    settings.redaction.detector_timeout_ms = 20;
    let service = DeidentificationService::with_detector(settings, Arc::new(SlowDetector)).unwrap();

    let err = service
        .redact("Mom Jessica", ReplacementStrategy::TypeMarker, TransferFacilityMode::Conservative)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DETECTOR_2001");
}

#[tokio::test]
async fn test_out_of_bounds_candidate_fails_closed() {
    let service = service_with(OutOfBoundsDetector);
    let result = service
        .redact("Mom Jessica", ReplacementStrategy::TypeMarker, TransferFacilityMode::Conservative)
        .await;
    assert!(matches!(result, Err(PhiError::DetectorUnavailable(_))));
}

#[tokio::test]
async fn test_failed_initialisation_is_detector_unavailable() {
    let service = DeidentificationService::with_factory(
        PhiSettings::default(),
        Arc::new(|| -> Result<Arc<dyn PhiDetector>> {
            Err(PhiError::configuration("model files missing"))
        }),
    )
    .unwrap();

    let err = service.warm_up().await.unwrap_err();
    assert!(matches!(err, PhiError::DetectorUnavailable(_)));
    assert!(!service.is_detector_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_initialises_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let service = Arc::new(
        DeidentificationService::with_factory(
            PhiSettings::default(),
            Arc::new(move || -> Result<Arc<dyn PhiDetector>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FixedDetector {
                    entries: vec![("PERSON", "Jessica", 0.9)],
                }) as Arc<dyn PhiDetector>)
            }),
        )
        .unwrap(),
    );

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            service
                .redact(
                    "Mom Jessica is at bedside.",
                    ReplacementStrategy::TypeMarker,
                    TransferFacilityMode::Conservative,
                )
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap().unwrap();
        assert_eq!(outcome.redacted_text, "Mom [NAME] is at bedside.");
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_replace_tables_applies_to_next_request() {
    let service = service_with(FixedDetector {
        entries: vec![("ROOM", "12", 0.45)],
    });
    let text = "Now in room 12.";

    let before = service
        .redact(text, ReplacementStrategy::TypeMarker, TransferFacilityMode::Conservative)
        .await
        .unwrap();
    assert_eq!(before.redacted_text, "Now in room [ROOM].");

    let mut raised = PhiSettings::default();
    raised.thresholds.per_category.insert("ROOM".to_string(), 0.5);
    service.replace_tables(CandidateFilter::from_settings(&raised).unwrap());

    let after = service
        .redact(text, ReplacementStrategy::TypeMarker, TransferFacilityMode::Conservative)
        .await
        .unwrap();
    assert_eq!(after.redacted_text, text);
}
