use config_engine::{ConfigError, PhiSettings};
use proptest::prelude::*;

fn outside_unit() -> impl Strategy<Value = f64> {
    prop_oneof![-10.0f64..-1e-6, (1.0f64 + 1e-6)..10.0]
}

proptest! {
    #[test]
    fn unit_thresholds_are_accepted(
        default_threshold in 0.0f64..=1.0,
        room in 0.0f64..=1.0,
        overlap in 0.0f64..=1.0,
        recall_floor in 0.0f64..=1.0,
    ) {
        let mut settings = PhiSettings::default();
        settings.thresholds.default_threshold = default_threshold;
        settings.thresholds.per_category.insert("ROOM".to_string(), room);
        settings.evaluation.overlap_threshold = overlap;
        settings.calibration.recall_floor = recall_floor;
        prop_assert!(settings.validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_is_named(threshold in outside_unit()) {
        let mut settings = PhiSettings::default();
        settings.thresholds.per_category.insert("ROOM".to_string(), threshold);

        match settings.validate() {
            Err(ConfigError::Validation(problems)) => {
                prop_assert_eq!(problems.len(), 1);
                prop_assert!(problems[0].contains("thresholds.per_category.ROOM"));
            }
            other => prop_assert!(false, "expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn negative_weights_are_rejected(weight in -100.0f64..-1e-6) {
        let mut settings = PhiSettings::default();
        settings.risk_weights.insert("PERSON".to_string(), weight);
        prop_assert!(settings.validate().is_err());

        settings.risk_weights.insert("PERSON".to_string(), -weight);
        prop_assert!(settings.validate().is_ok());
    }

    #[test]
    fn confidence_level_must_be_open_unit(level in outside_unit()) {
        let mut settings = PhiSettings::default();
        settings.evaluation.confidence_level = level;
        prop_assert!(settings.validate().is_err());
    }
}
