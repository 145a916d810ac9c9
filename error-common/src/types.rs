use crate::codes;
use thiserror::Error;

/// Error taxonomy shared by the redaction and validation engines
#[derive(Error, Debug)]
pub enum PhiError {
    /// Malformed threshold, deny-list or weight tables
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Detector could not be initialised, failed, or timed out
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    /// Corpus item whose annotations do not fit its source text
    #[error("Data integrity error in item {item_id}: {reason}")]
    DataIntegrity { item_id: String, reason: String },

    /// Too few ground-truth instances to calibrate a category
    #[error("Insufficient sample for {category}: {found} ground-truth spans, {required} required")]
    InsufficientSample {
        category: String,
        found: usize,
        required: usize,
    },

    /// Exclusions exceeded the sanity bound for a corpus run
    #[error("Excluded {excluded} of {total} corpus items, above the {max_ratio:.2} ratio limit")]
    ExclusionLimitExceeded {
        excluded: usize,
        total: usize,
        max_ratio: f64,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhiError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn detector_unavailable(message: impl Into<String>) -> Self {
        Self::DetectorUnavailable(message.into())
    }

    pub fn data_integrity(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code for logs and persisted run documents
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => codes::configuration::INVALID_TABLE,
            Self::DetectorUnavailable(_) => codes::detector::UNAVAILABLE,
            Self::DataIntegrity { .. } => codes::data::INTEGRITY,
            Self::InsufficientSample { .. } => codes::calibration::INSUFFICIENT_SAMPLE,
            Self::ExclusionLimitExceeded { .. } => codes::data::EXCLUSION_LIMIT,
            Self::Serialization(_) | Self::Yaml(_) => codes::system::SERIALIZATION,
            Self::Io(_) => codes::system::IO,
            Self::Other(_) => codes::system::INTERNAL,
        }
    }

    /// Whether the error aborts the whole operation.
    ///
    /// Data-integrity and insufficient-sample errors only exclude one item or
    /// one category; everything else stops the request or run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::DataIntegrity { .. } | Self::InsufficientSample { .. }
        )
    }
}

/// Result type alias for PHI engine operations
pub type Result<T> = std::result::Result<T, PhiError>;

/// Log an error with its stable code
pub fn log_error(context: &str, error: &PhiError) {
    if error.is_fatal() {
        tracing::error!(context = context, code = error.code(), error = %error, "PHI engine error");
    } else {
        tracing::warn!(context = context, code = error.code(), error = %error, "PHI engine item excluded");
    }
}
