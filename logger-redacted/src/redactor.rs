use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

// Literal patterns, compiled once
#[allow(clippy::expect_used)]
mod patterns {
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        pub static ref EMAIL_REGEX: Regex =
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern");
        pub static ref PHONE_REGEX: Regex =
            Regex::new(r"(?:\+1[-.\s]?)?\(?\b[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b").expect("phone pattern");
        pub static ref SSN_REGEX: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern");
        pub static ref DIGIT_RUN_REGEX: Regex = Regex::new(r"\b\d{6,}\b").expect("digit run pattern");
    }
}

/// PHI redaction configuration for log output
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    /// Long digit runs (MRNs, account numbers)
    pub redact_digit_runs: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_digit_runs: true,
        }
    }
}

/// PHI-safe helpers for log fields
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    /// Mask identifier-shaped substrings of a free-form message.
    ///
    /// Detector and loader error strings can echo the text they failed on;
    /// this runs before such strings are logged or returned as warnings.
    pub fn scrub(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_emails {
            result = patterns::EMAIL_REGEX.replace_all(&result, "[EMAIL]").into_owned();
        }

        if self.config.redact_ssn {
            result = patterns::SSN_REGEX.replace_all(&result, "[SSN]").into_owned();
        }

        if self.config.redact_phones {
            result = patterns::PHONE_REGEX.replace_all(&result, "[PHONE]").into_owned();
        }

        if self.config.redact_digit_runs {
            result = patterns::DIGIT_RUN_REGEX.replace_all(&result, "[NUMBER]").into_owned();
        }

        result
    }

    /// Short correlation digest of a text; never reversible to the content
    pub fn fingerprint(&self, value: &str) -> String {
        let digest = Sha256::digest(value.as_bytes());
        let prefix = digest.get(..8).unwrap_or_default();
        general_purpose::STANDARD_NO_PAD.encode(prefix)
    }

    /// Full hex SHA-256, used for reproducibility records of corpus files
    pub fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}
