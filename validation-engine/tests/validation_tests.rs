use config_engine::{PhiSettings, SettingsLoader};
use deidentification_engine::{Candidate, GroundTruthSpan, Span};
use error_common::PhiError;
use std::collections::BTreeMap;
use validation_engine::{
    report, CorpusItem, FailureMode, MetricsAggregator, OutcomeCounts, SpanMatcher,
    ValidationOrchestrator, Verdict,
};

fn span_of(text: &str, surface: &str) -> Span {
    let start = text.find(surface).unwrap();
    Span::new(start, start + surface.len())
}

fn item(
    id: &str,
    text: &str,
    ground_truth: &[(&str, &str)],
    candidates: &[(&str, &str, f64)],
) -> CorpusItem {
    CorpusItem {
        id: id.to_string(),
        text: text.to_string(),
        ground_truth: ground_truth
            .iter()
            .map(|(category, surface)| GroundTruthSpan {
                category: (*category).to_string(),
                span: span_of(text, surface),
                source_text: (*surface).to_string(),
            })
            .collect(),
        candidates: candidates
            .iter()
            .map(|(category, surface, score)| Candidate {
                category: (*category).to_string(),
                span: span_of(text, surface),
                score: *score,
                source_text: (*surface).to_string(),
            })
            .collect(),
        detector_error: None,
    }
}

fn fast_settings() -> PhiSettings {
    let mut settings = PhiSettings::default();
    settings.evaluation.bootstrap_iterations = 500;
    settings
}

/// Ten handoffs; every guardian name found, one room number missed
fn handoffs() -> Vec<CorpusItem> {
    let mut items: Vec<CorpusItem> = (0..9)
        .map(|i| {
            item(
                &format!("h{i}"),
                "Mom Jessica at bedside, in room 12.",
                &[("PERSON", "Jessica"), ("ROOM", "12")],
                &[("GUARDIAN_NAME", "Jessica", 0.85), ("ROOM", "12", 0.6)],
            )
        })
        .collect();
    items.push(item(
        "h9",
        "Dad Mike reachable, bay 4 overnight.",
        &[("PERSON", "Mike"), ("ROOM", "4")],
        &[("PERSON", "Mike", 0.9)],
    ));
    items
}

#[test]
fn test_room_number_inside_longer_candidate() {
    let text = "Patient in bed 12 overnight.";
    let ground_truth = vec![GroundTruthSpan {
        category: "ROOM".to_string(),
        span: span_of(text, "12"),
        source_text: "12".to_string(),
    }];
    let candidates = vec![Candidate {
        category: "ROOM".to_string(),
        span: span_of(text, "bed 12"),
        score: 0.6,
        source_text: "bed 12".to_string(),
    }];

    // "12" within "bed 12" overlaps 2/6
    let lenient = SpanMatcher::new(0.3, BTreeMap::new());
    let outcome = lenient.evaluate_item(&ground_truth, &candidates);
    assert_eq!(outcome.counts()["ROOM"], OutcomeCounts::new(1, 0, 0));

    let strict = SpanMatcher::from_settings(&PhiSettings::default());
    let outcome = strict.evaluate_item(&ground_truth, &candidates);
    assert_eq!(outcome.counts()["ROOM"], OutcomeCounts::new(0, 1, 1));
}

#[test]
fn test_zero_weight_category_is_invisible_to_weighted_recall() {
    let mut aggregator = MetricsAggregator::new();
    aggregator.add("A", &OutcomeCounts::new(100, 0, 0));
    aggregator.add("B", &OutcomeCounts::new(0, 100, 0));
    let weights = BTreeMap::from([("A".to_string(), 5.0), ("B".to_string(), 0.0)]);

    assert_eq!(aggregator.weighted(&weights).recall, 1.0);
    assert_eq!(aggregator.overall().recall, 0.5);
}

#[test]
fn test_evaluate_corpus_counts_and_weights() {
    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let evaluation = orchestrator.evaluate_corpus(&handoffs()).unwrap();

    assert_eq!(evaluation.evaluated_items, 10);
    assert_eq!(evaluation.counts["PERSON"], OutcomeCounts::new(10, 0, 0));
    assert_eq!(evaluation.counts["ROOM"], OutcomeCounts::new(9, 1, 0));
    assert_eq!(evaluation.totals, OutcomeCounts::new(19, 1, 0));
    assert_eq!(evaluation.overall.recall, 0.95);
    assert_eq!(evaluation.overall.precision, 1.0);

    // PERSON 5 x 10 + ROOM 4 x 9 over 5 x 10 + 4 x 10
    let expected = (50.0 + 36.0) / 90.0;
    assert!((evaluation.frequency_weighted.recall - expected).abs() < 1e-12);

    let ci = &evaluation.recall_ci;
    assert!(ci.lower <= ci.point && ci.point <= ci.upper);
    assert_eq!(ci.point, 0.95);

    assert!(evaluation
        .weight_comparison
        .zero_frequency
        .contains(&"LOCATION".to_string()));
    assert!(evaluation
        .weight_comparison
        .divergent
        .iter()
        .any(|(category, _, _)| category == "MEDICAL_RECORD_NUMBER"));

    assert_eq!(evaluation.failures.len(), 1);
    assert_eq!(evaluation.failures[0].text, "4");
}

#[test]
fn test_reversed_span_is_excluded_not_fatal() {
    let mut items = handoffs();
    items[3].ground_truth[0].span = Span::new(11, 4);

    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let evaluation = orchestrator.evaluate_corpus(&items).unwrap();

    assert_eq!(evaluation.item_count, 10);
    assert_eq!(evaluation.evaluated_items, 9);
    assert_eq!(evaluation.exclusions.len(), 1);
    assert_eq!(evaluation.exclusions[0].item_id, "h3");
    assert_eq!(evaluation.exclusions[0].code, "DATA_3001");
    assert_eq!(evaluation.counts["PERSON"].ground_truth(), 9);
}

#[test]
fn test_small_corpus_evaluates_around_bad_item() {
    let mut items: Vec<CorpusItem> = handoffs().into_iter().take(3).collect();
    items[1].ground_truth[0].span = Span::new(11, 4);

    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let evaluation = orchestrator.evaluate_corpus(&items).unwrap();

    assert_eq!(evaluation.item_count, 3);
    assert_eq!(evaluation.evaluated_items, 2);
    assert_eq!(evaluation.exclusions.len(), 1);
    assert_eq!(evaluation.exclusions[0].item_id, "h1");
    assert_eq!(evaluation.totals, OutcomeCounts::new(4, 0, 0));
}

#[test]
fn test_evaluation_keeps_going_past_exclusion_ratio() {
    let mut items = handoffs();
    items[0].ground_truth[0].span = Span::new(11, 4);
    items[1].detector_error = Some("detector crashed".to_string());

    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let evaluation = orchestrator.evaluate_corpus(&items).unwrap();
    assert_eq!(evaluation.evaluated_items, 8);
    assert_eq!(evaluation.exclusions.len(), 2);
}

#[test]
fn test_calibration_aborts_on_too_many_exclusions() {
    let mut items = room_corpus();
    items[0].ground_truth[0].span = Span::new(11, 4);
    items[1].detector_error = Some("detector crashed".to_string());

    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let err = orchestrator
        .calibrate(&items, &[0.30, 0.40], 0.90)
        .unwrap_err();
    assert!(matches!(err, PhiError::ExclusionLimitExceeded { excluded: 2, total: 10, .. }));
}

#[test]
fn test_calibration_tolerates_exclusions_within_ratio() {
    let mut items = room_corpus();
    items[4].ground_truth[0].span = Span::new(11, 4);

    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let report = orchestrator.calibrate(&items, &[0.30, 0.40], 0.90).unwrap();
    assert_eq!(report.exclusions.len(), 1);
    assert_eq!(report.record.item_count, 10);
    assert_eq!(report.record.excluded_count, 1);
    assert_eq!(report.result("ROOM").unwrap().ground_truth_count, 9);
}

#[test]
fn test_decide_gates_on_recall_lower_bound() {
    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();

    let evaluation = orchestrator.evaluate_corpus(&handoffs()).unwrap();
    let decision = orchestrator.decide(&evaluation);
    assert_eq!(decision.verdict, Verdict::ReturnForImprovement);
    assert!(decision.recall_lower_bound < 0.95);
    assert!(decision.reasoning.contains("is below the 95.0% safety threshold"));

    let perfect: Vec<CorpusItem> = handoffs().into_iter().take(9).collect();
    let evaluation = orchestrator.evaluate_corpus(&perfect).unwrap();
    let decision = orchestrator.decide(&evaluation);
    assert_eq!(decision.verdict, Verdict::Deploy);
    assert_eq!(decision.recall_lower_bound, 1.0);
}

#[test]
fn test_failure_taxonomy_from_evaluation() {
    let mut items = handoffs();
    items.push(item(
        "h10",
        "Patient Mary Elizabeth Johnson admitted, mom at bedside.",
        &[("PERSON", "Mary Elizabeth Johnson")],
        &[("PERSON", "Mary", 0.9)],
    ));

    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let evaluation = orchestrator.evaluate_corpus(&items).unwrap();
    let taxonomy = orchestrator.classify_failures(&evaluation);

    assert_eq!(taxonomy.total_false_negatives, 2);
    assert_eq!(taxonomy.count(FailureMode::SpanBoundary), 1);
    assert_eq!(taxonomy.count(FailureMode::PatternMiss), 1);

    let decision = orchestrator.decide(&evaluation);
    let markdown = report::compliance_report(&evaluation, &taxonomy, &decision);
    assert!(markdown.contains("RETURN FOR IMPROVEMENT"));
    assert!(markdown.contains("SPAN_BOUNDARY"));
    assert!(!markdown.contains("Mary Elizabeth Johnson"));
}

/// Ten room mentions: nine detected at 0.65, one at 0.45, with six
/// low-scoring false alarms
fn room_corpus() -> Vec<CorpusItem> {
    (0..10)
        .map(|i| {
            let score = if i == 9 { 0.45 } else { 0.65 };
            let mut candidates = vec![("ROOM", "12", score)];
            if i < 6 {
                candidates.push(("ROOM", "Now", 0.35));
            }
            let ground_truth: &[(&str, &str)] = if i < 2 {
                &[("ROOM", "12"), ("PERSON", "Rosa")]
            } else {
                &[("ROOM", "12")]
            };
            item(&format!("r{i}"), "Now in room 12 with Rosa.", ground_truth, &candidates)
        })
        .collect()
}

#[test]
fn test_calibration_picks_best_f2_and_skips_small_categories() {
    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let report = orchestrator
        .calibrate(&room_corpus(), &[0.30, 0.40, 0.50, 0.60], 0.90)
        .unwrap();

    let room = report.result("ROOM").unwrap();
    assert_eq!(room.chosen_threshold, 0.40);
    assert_eq!(room.recall, 1.0);
    assert_eq!(room.precision, 1.0);
    assert!(!room.needs_improvement);
    assert_eq!(room.sweep_rows.len(), 4);
    assert_eq!(room.sweep_rows[0].counts, OutcomeCounts::new(10, 0, 6));
    assert_eq!(room.sweep_rows[2].counts, OutcomeCounts::new(9, 1, 0));
    assert!(room.rationale.starts_with("Threshold 0.40 maximizes F2=100.0%"));

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].category, "PERSON");
    assert_eq!(report.skipped[0].found, 2);

    assert_eq!(report.pr_curves["ROOM"].len(), 4);
    assert_eq!(report.record.dataset_sha256.len(), 64);
    assert_eq!(report.record.seed, 42);
    assert_eq!(report.record.sweep_thresholds, vec![0.30, 0.40, 0.50, 0.60]);
}

#[test]
fn test_calibration_flags_unreachable_floor() {
    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let report = orchestrator
        .calibrate(&room_corpus(), &[0.50, 0.60], 0.95)
        .unwrap();

    let room = report.result("ROOM").unwrap();
    assert!(room.needs_improvement);
    assert_eq!(room.chosen_threshold, 0.50);
    assert!(room.rationale.contains("Pattern improvements required"));
}

#[test]
fn test_calibration_rejects_empty_sweep() {
    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let err = orchestrator.calibrate(&room_corpus(), &[], 0.90).unwrap_err();
    assert_eq!(err.code(), "CONFIG_1001");
}

#[test]
fn test_calibration_artifacts_load_back_as_settings() {
    let orchestrator = ValidationOrchestrator::new(fast_settings()).unwrap();
    let calibration = orchestrator
        .calibrate(&room_corpus(), &[0.30, 0.40, 0.50, 0.60], 0.90)
        .unwrap();

    let dir = std::env::temp_dir().join(format!("phi-calibration-{}", uuid::Uuid::new_v4()));
    let base = PhiSettings::default().thresholds;
    let written = report::write_calibration(&dir, &calibration, &base).unwrap();
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|path| path.exists()));

    let overlay = std::fs::read_to_string(dir.join(report::OVERLAY_FILE)).unwrap();
    let settings = SettingsLoader::new().without_env().with_yaml(overlay).load().unwrap();
    assert_eq!(settings.thresholds.threshold_for("ROOM"), 0.40);
    assert_eq!(settings.thresholds.threshold_for("PERSON"), 0.30);

    let optimal: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join(report::OPTIMAL_FILE)).unwrap()).unwrap();
    assert_eq!(optimal["thresholds"]["ROOM"]["optimal_threshold"], 0.4);

    std::fs::remove_dir_all(&dir).unwrap();
}
