use crate::error::Result;
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a deny-list term is compared against a candidate's surface text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyMatchMode {
    /// Case-insensitive full-text equality (names, roles, age words)
    Exact,
    /// Case-insensitive term match bounded by word boundaries
    WordBoundary,
    /// Case-insensitive containment anywhere in the surface text
    Substring,
}

/// Replacement applied to each surviving candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStrategy {
    /// Short bracketed category label, e.g. `[NAME]`
    #[default]
    TypeMarker,
    /// `[REDACTED]` for every category
    FixedMarker,
    /// One mask character per original character
    MaskCharacters,
    /// Original text unchanged
    Keep,
}

/// Handling of the designated transfer-facility location category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFacilityMode {
    /// Redact facility locations like any other identifier
    #[default]
    Conservative,
    /// Keep facility names readable for care coordination
    Clinical,
}

impl std::str::FromStr for TransferFacilityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "clinical" => Ok(Self::Clinical),
            other => Err(format!("unknown transfer facility mode '{other}'")),
        }
    }
}

/// Per-category confidence thresholds with a fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    /// Used for categories missing from `per_category`
    pub default_threshold: f64,
    pub per_category: BTreeMap<String, f64>,
}

impl ThresholdSettings {
    pub fn threshold_for(&self, category: &str) -> f64 {
        self.per_category
            .get(category)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        let per_category = [
            "PERSON",
            "PHONE_NUMBER",
            "EMAIL_ADDRESS",
            "DATE_TIME",
            "LOCATION",
            "MEDICAL_RECORD_NUMBER",
            "ROOM",
            "PEDIATRIC_AGE",
            "GUARDIAN_NAME",
            "PROVIDER_NAME",
        ]
        .into_iter()
        .map(|category| (category.to_string(), 0.30))
        .collect();

        Self {
            default_threshold: 0.35,
            per_category,
        }
    }
}

/// Deny-list terms for one category and the mode they are matched with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyListSettings {
    pub mode: DenyMatchMode,
    pub terms: Vec<String>,
}

impl DenyListSettings {
    fn new(mode: DenyMatchMode, terms: &[&str]) -> Self {
        Self {
            mode,
            terms: terms.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    pub default_strategy: ReplacementStrategy,
    /// Category whose replacement follows the facility mode
    pub transfer_facility_category: String,
    pub transfer_facility_mode: TransferFacilityMode,
    /// Upper bound on one detector call before the request fails closed
    pub detector_timeout_ms: u64,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            default_strategy: ReplacementStrategy::TypeMarker,
            transfer_facility_category: "LOCATION".to_string(),
            transfer_facility_mode: TransferFacilityMode::Conservative,
            detector_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerSettings {
    /// Register the medical, pediatric and provider recognizer sets
    pub enable_custom_recognizers: bool,
    /// Hospital-specific record number patterns
    pub mrn_patterns: Vec<String>,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            enable_custom_recognizers: true,
            mrn_patterns: vec![
                r"\b\d{7,10}\b".to_string(),
                r"\bMRN[:\s]?\d{6,10}\b".to_string(),
                r"\b[A-Z]{2}\d{6,8}\b".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Minimum Jaccard overlap for a span match
    pub overlap_threshold: f64,
    pub bootstrap_iterations: usize,
    pub confidence_level: f64,
    pub bootstrap_seed: u64,
    /// Recall CI lower bound required for a deploy verdict
    pub deploy_threshold: f64,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
            bootstrap_iterations: 10_000,
            confidence_level: 0.95,
            bootstrap_seed: 42,
            deploy_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub sweep_thresholds: Vec<f64>,
    pub recall_floor: f64,
    /// F2 distance within which the higher-recall threshold wins
    pub f2_tie_tolerance: f64,
    /// Ground-truth spans a category needs before it is calibrated
    pub min_ground_truth: usize,
    /// Excluded-item ratio above which a corpus run aborts
    pub max_exclusion_ratio: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            sweep_thresholds: vec![0.30, 0.40, 0.50, 0.60],
            recall_floor: 0.90,
            f2_tie_tolerance: 0.005,
            min_ground_truth: 5,
            max_exclusion_ratio: 0.10,
        }
    }
}

/// Every tunable of the redaction and validation engines.
///
/// Loaded once at startup (see [`crate::SettingsLoader`]) and treated as
/// read-only afterwards; calibration output replaces the threshold table
/// wholesale through [`PhiSettings::with_thresholds`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhiSettings {
    /// Categories requested from the detector
    pub phi_entities: Vec<String>,
    pub thresholds: ThresholdSettings,
    pub deny_lists: BTreeMap<String, DenyListSettings>,
    /// Ground-truth category to the candidate categories accepted for it
    pub compatibility: BTreeMap<String, Vec<String>>,
    /// Spoken-handoff relevance of each category
    pub frequency_weights: BTreeMap<String, f64>,
    /// Severity of a leak in each category
    pub risk_weights: BTreeMap<String, f64>,
    pub redaction: RedactionSettings,
    pub recognizers: RecognizerSettings,
    pub evaluation: EvaluationSettings,
    pub calibration: CalibrationSettings,
    pub logging: LoggerConfig,
}

impl PhiSettings {
    /// Replace the per-category threshold table, keeping the fallback
    #[must_use]
    pub fn with_thresholds(mut self, per_category: BTreeMap<String, f64>) -> Self {
        self.thresholds.per_category = per_category
            .into_iter()
            .map(|(category, threshold)| (category.to_ascii_uppercase(), threshold))
            .collect();
        self
    }

    /// Render the threshold table as a settings overlay document.
    ///
    /// The output loads back through [`crate::SettingsLoader::with_yaml`].
    ///
    /// # Errors
    ///
    /// [`crate::ConfigError::Render`] if serialization fails.
    pub fn threshold_overlay_yaml(thresholds: &ThresholdSettings) -> Result<String> {
        #[derive(Serialize)]
        struct Overlay<'a> {
            thresholds: &'a ThresholdSettings,
        }
        Ok(serde_yaml::to_string(&Overlay { thresholds })?)
    }

    /// Candidate categories accepted for a ground-truth category.
    ///
    /// A category without an entry only matches itself.
    pub fn compatible_categories(&self, ground_truth_category: &str) -> Vec<String> {
        self.compatibility
            .get(ground_truth_category)
            .cloned()
            .unwrap_or_else(|| vec![ground_truth_category.to_string()])
    }

    /// Upper-case every category key.
    ///
    /// Environment and file sources may lower-case map keys; categories are
    /// compared verbatim everywhere else.
    pub(crate) fn normalize_categories(&mut self) {
        fn upper<V>(map: &mut BTreeMap<String, V>) {
            *map = std::mem::take(map)
                .into_iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v))
                .collect();
        }

        for entity in &mut self.phi_entities {
            *entity = entity.to_ascii_uppercase();
        }
        upper(&mut self.thresholds.per_category);
        upper(&mut self.deny_lists);
        upper(&mut self.compatibility);
        for accepted in self.compatibility.values_mut() {
            for category in accepted.iter_mut() {
                *category = category.to_ascii_uppercase();
            }
        }
        upper(&mut self.frequency_weights);
        upper(&mut self.risk_weights);
        self.redaction.transfer_facility_category =
            self.redaction.transfer_facility_category.to_ascii_uppercase();
    }
}

impl Default for PhiSettings {
    fn default() -> Self {
        Self {
            phi_entities: default_entities(),
            thresholds: ThresholdSettings::default(),
            deny_lists: default_deny_lists(),
            compatibility: default_compatibility(),
            frequency_weights: weights(&[
                ("PERSON", 5.0),
                ("GUARDIAN_NAME", 5.0),
                ("ROOM", 4.0),
                ("PHONE_NUMBER", 2.0),
                ("DATE_TIME", 2.0),
                ("MEDICAL_RECORD_NUMBER", 1.0),
                ("EMAIL_ADDRESS", 0.0),
                ("LOCATION", 0.0),
                ("PEDIATRIC_AGE", 0.0),
            ]),
            risk_weights: weights(&[
                ("PERSON", 5.0),
                ("GUARDIAN_NAME", 5.0),
                ("MEDICAL_RECORD_NUMBER", 5.0),
                ("PHONE_NUMBER", 4.0),
                ("EMAIL_ADDRESS", 4.0),
                ("LOCATION", 4.0),
                ("ROOM", 2.0),
                ("DATE_TIME", 2.0),
                ("PEDIATRIC_AGE", 1.0),
            ]),
            redaction: RedactionSettings::default(),
            recognizers: RecognizerSettings::default(),
            evaluation: EvaluationSettings::default(),
            calibration: CalibrationSettings::default(),
            logging: LoggerConfig::default(),
        }
    }
}

fn default_entities() -> Vec<String> {
    [
        "PERSON",
        "PHONE_NUMBER",
        "EMAIL_ADDRESS",
        "DATE_TIME",
        "LOCATION",
        "US_SSN",
        "MEDICAL_LICENSE",
        "US_DRIVER_LICENSE",
        "MEDICAL_RECORD_NUMBER",
        "ROOM",
        "GUARDIAN_NAME",
        "PEDIATRIC_AGE",
        "PROVIDER_NAME",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn weights(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(category, weight)| ((*category).to_string(), *weight))
        .collect()
}

fn default_compatibility() -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        "PERSON".to_string(),
        vec![
            "PERSON".to_string(),
            "GUARDIAN_NAME".to_string(),
            "PROVIDER_NAME".to_string(),
        ],
    );
    map
}

fn default_deny_lists() -> BTreeMap<String, DenyListSettings> {
    use DenyMatchMode::{Exact, Substring, WordBoundary};

    let mut lists = BTreeMap::new();

    // Clinical abbreviations a general NER model reads as places
    lists.insert(
        "LOCATION".to_string(),
        DenyListSettings::new(
            WordBoundary,
            &[
                "NC", "RA", "OR", "ER", "ED", "IV", "PO", "IM", "SQ", "PR", "GT", "NG", "OG", "NJ",
            ],
        ),
    );

    lists.insert(
        "PERSON".to_string(),
        DenyListSettings::new(
            Exact,
            &[
                "mom", "dad", "parent", "parents", "guardian", "caregiver", "nurse", "doctor",
                "attending", "resident", "fellow", "intern", "NP", "PA", "RN", "LPN", "CNA",
                "baby", "infant", "newborn", "neonate", "kid", "child", "toddler", "DKA", "CT",
                "MRI", "EEG", "ECG", "EKG", "ICU", "PICU", "NICU",
            ],
        ),
    );

    lists.insert(
        "GUARDIAN_NAME".to_string(),
        DenyListSettings::new(
            Exact,
            &["parent", "guardian", "caregiver", "family", "uh", "um"],
        ),
    );

    lists.insert(
        "PROVIDER_NAME".to_string(),
        DenyListSettings::new(
            Exact,
            &["doctor", "physician", "attending", "fellow", "resident", "nurse"],
        ),
    );

    lists.insert(
        "PEDIATRIC_AGE".to_string(),
        DenyListSettings::new(
            Exact,
            &["infant", "toddler", "child", "adolescent", "teen", "newborn", "neonate"],
        ),
    );

    // Relative times, dosing schedules and clinical timeline phrases
    lists.insert(
        "DATE_TIME".to_string(),
        DenyListSettings::new(
            Substring,
            &[
                "today", "tonight", "yesterday", "tomorrow", "overnight", "q4h", "q6h", "q8h",
                "q12h", "BID", "TID", "QID", "PRN", "daily", "nightly", "qd", "qhs", "day 1",
                "day 2", "day 3", "day 4", "day 5", "day 6", "day 7", "day 8", "day 9", "day 10",
                "day 11", "day 12", "day 13", "day 14", "day of life", "dol", "days old",
                "weeks old", "months old", "years old", "week old", "month old", "year old",
                "day old", "day-old", "week-old", "month-old", "year-old", "days-old",
                "weeks-old", "months-old", "years-old", "hours ago", "minutes ago",
                "this morning", "this afternoon", "this evening", "last night", "three minutes",
                "two minutes", "five minutes",
            ],
        ),
    );

    lists
}
