use deidentification_engine::{Candidate, GroundTruthSpan};
use error_common::{PhiError, Result};
use logger_redacted::PiiRedactor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One labelled text with the raw detector output for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub id: String,
    pub text: String,
    #[serde(default, alias = "phi_spans")]
    pub ground_truth: Vec<GroundTruthSpan>,
    /// Unfiltered detector candidates
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Set when the detector failed on this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_error: Option<String>,
}

impl CorpusItem {
    /// Check every annotation and candidate against the text.
    ///
    /// # Errors
    ///
    /// `DataIntegrity` naming the first span out of bounds, reversed, off a
    /// char boundary, or whose annotated text differs from the source slice.
    pub fn check_integrity(&self) -> Result<()> {
        for (index, expected) in self.ground_truth.iter().enumerate() {
            expected.span.check_bounds(&self.text).map_err(|reason| {
                PhiError::data_integrity(&self.id, format!("ground truth {index}: {reason}"))
            })?;
            let slice = expected.span.slice(&self.text).unwrap_or_default();
            if !expected.source_text.is_empty() && slice != expected.source_text {
                return Err(PhiError::data_integrity(
                    &self.id,
                    format!(
                        "ground truth {index} ({}) annotated text does not match source at {}..{}",
                        expected.category, expected.span.start, expected.span.end
                    ),
                ));
            }
        }
        for (index, candidate) in self.candidates.iter().enumerate() {
            candidate.span.check_bounds(&self.text).map_err(|reason| {
                PhiError::data_integrity(&self.id, format!("candidate {index}: {reason}"))
            })?;
        }
        Ok(())
    }
}

/// Item left out of a run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub item_id: String,
    pub code: String,
    pub reason: String,
}

/// Split items into usable ones and recorded exclusions.
///
/// Items whose detector run failed, or whose spans do not fit their text,
/// are excluded with a warning. Detector messages are scrubbed before they
/// are recorded.
pub fn partition(items: &[CorpusItem]) -> (Vec<&CorpusItem>, Vec<Exclusion>) {
    let redactor = PiiRedactor::default();
    let mut usable = Vec::with_capacity(items.len());
    let mut excluded = Vec::new();

    for item in items {
        let failure = match &item.detector_error {
            Some(message) => Some(PhiError::detector_unavailable(redactor.scrub(message))),
            None => item.check_integrity().err(),
        };
        match failure {
            Some(error) => {
                warn!(item_id = %item.id, code = error.code(), error = %error, "Corpus item excluded");
                excluded.push(Exclusion {
                    item_id: item.id.clone(),
                    code: error.code().to_string(),
                    reason: error.to_string(),
                });
            }
            None => usable.push(item),
        }
    }
    (usable, excluded)
}

/// Abort when too large a share of the corpus was excluded.
///
/// # Errors
///
/// `ExclusionLimitExceeded` when `excluded / total > max_ratio`.
pub fn check_exclusion_limit(excluded: usize, total: usize, max_ratio: f64) -> Result<()> {
    if total > 0 && excluded as f64 / total as f64 > max_ratio {
        return Err(PhiError::ExclusionLimitExceeded {
            excluded,
            total,
            max_ratio,
        });
    }
    Ok(())
}

/// Source name recorded for corpora built in memory
pub const IN_MEMORY_SOURCE: &str = "in-memory";

/// Hex SHA-256 of the items' JSON encoding
///
/// # Errors
///
/// `Serialization` if the items cannot be encoded.
pub fn fingerprint(items: &[CorpusItem]) -> Result<String> {
    Ok(PiiRedactor::sha256_hex(&serde_json::to_vec(items)?))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusDocument {
    Items(Vec<CorpusItem>),
    Wrapped {
        #[serde(alias = "handoffs")]
        items: Vec<CorpusItem>,
    },
}

/// Labelled corpus with a fingerprint of its source documents
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    pub items: Vec<CorpusItem>,
    pub sources: Vec<String>,
    /// SHA-256 of the source bytes, in load order
    pub sha256: String,
}

impl Corpus {
    /// In-memory corpus; fingerprinted over its JSON encoding
    ///
    /// # Errors
    ///
    /// `Serialization` if the items cannot be encoded.
    pub fn from_items(items: Vec<CorpusItem>) -> Result<Self> {
        Ok(Self {
            sha256: fingerprint(&items)?,
            items,
            sources: vec![IN_MEMORY_SOURCE.to_string()],
        })
    }

    /// Parse a corpus document: either an array of items or an object with
    /// an `items` (or `handoffs`) array.
    ///
    /// # Errors
    ///
    /// `Serialization` on malformed JSON.
    pub fn from_json_str(source: &str, json: &str) -> Result<Self> {
        let items = match serde_json::from_str::<CorpusDocument>(json)? {
            CorpusDocument::Items(items) | CorpusDocument::Wrapped { items } => items,
        };
        Ok(Self {
            items,
            sources: vec![source.to_string()],
            sha256: PiiRedactor::sha256_hex(json.as_bytes()),
        })
    }

    /// Load and concatenate corpus files.
    ///
    /// # Errors
    ///
    /// `Io` if a file cannot be read, `Serialization` if one is malformed.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut items = Vec::new();
        let mut sources = Vec::new();
        let mut bytes = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let json = std::fs::read_to_string(path)?;
            let document = Self::from_json_str(&path.display().to_string(), &json)?;
            info!(source = %path.display(), items = document.items.len(), "Loaded corpus file");
            items.extend(document.items);
            sources.extend(document.sources);
            bytes.extend_from_slice(json.as_bytes());
        }

        Ok(Self {
            items,
            sources,
            sha256: PiiRedactor::sha256_hex(&bytes),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
