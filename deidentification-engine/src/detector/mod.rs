pub mod builtin;
pub mod pattern;

pub use pattern::{PatternRecognizer, PatternRule};

use crate::models::Candidate;
use async_trait::async_trait;
use config_engine::RecognizerSettings;
use error_common::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of raw, unfiltered candidates for a text.
///
/// Offsets in returned candidates are UTF-8 byte offsets into `text`.
#[async_trait]
pub trait PhiDetector: Send + Sync {
    /// Candidates of the requested categories; an empty slice requests all
    async fn text_to_candidates(&self, text: &str, categories: &[String]) -> Result<Vec<Candidate>>;
}

/// One synchronous rule set registered into a [`CompositeDetector`]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Category of every candidate this recognizer emits
    fn category(&self) -> &str;

    fn recognize(&self, text: &str) -> Vec<Candidate>;
}

/// Detector that merges the output of registered recognizers
#[derive(Default)]
pub struct CompositeDetector {
    recognizers: RwLock<Vec<Arc<dyn Recognizer>>>,
}

impl CompositeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector with the built-in rule sets enabled by `settings`.
    ///
    /// # Errors
    ///
    /// `Configuration` if a configured record-number pattern fails to compile.
    pub fn with_builtin(settings: &RecognizerSettings) -> Result<Self> {
        let detector = Self::new();
        for recognizer in builtin::core_recognizers()? {
            detector.register(Arc::new(recognizer));
        }
        if settings.enable_custom_recognizers {
            let custom = builtin::medical_recognizers(&settings.mrn_patterns)?
                .into_iter()
                .chain(builtin::pediatric_recognizers()?)
                .chain(builtin::provider_recognizers()?);
            for recognizer in custom {
                detector.register(Arc::new(recognizer));
            }
        }
        tracing::info!(
            recognizers = detector.recognizer_names().len(),
            custom = settings.enable_custom_recognizers,
            "Composite detector ready"
        );
        Ok(detector)
    }

    pub fn register(&self, recognizer: Arc<dyn Recognizer>) {
        tracing::debug!(
            recognizer = recognizer.name(),
            category = recognizer.category(),
            "Registering recognizer"
        );
        self.recognizers.write().push(recognizer);
    }

    pub fn recognizer_names(&self) -> Vec<String> {
        self.recognizers
            .read()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Run every matching recognizer and merge duplicates.
    ///
    /// The same category and span reported twice keeps the higher score.
    pub fn detect(&self, text: &str, categories: &[String]) -> Vec<Candidate> {
        let recognizers: Vec<Arc<dyn Recognizer>> = self.recognizers.read().clone();

        let mut merged: HashMap<(String, usize, usize), Candidate> = HashMap::new();
        for recognizer in recognizers
            .iter()
            .filter(|r| categories.is_empty() || categories.iter().any(|c| c == r.category()))
        {
            for candidate in recognizer.recognize(text) {
                let key = (
                    candidate.category.clone(),
                    candidate.span.start,
                    candidate.span.end,
                );
                match merged.get(&key) {
                    Some(existing) if existing.score >= candidate.score => {}
                    _ => {
                        merged.insert(key, candidate);
                    }
                }
            }
        }

        let mut candidates: Vec<Candidate> = merged.into_values().collect();
        candidates.sort_by(|a, b| {
            (a.span.start, a.span.end, &a.category).cmp(&(b.span.start, b.span.end, &b.category))
        });
        candidates
    }
}

#[async_trait]
impl PhiDetector for CompositeDetector {
    async fn text_to_candidates(&self, text: &str, categories: &[String]) -> Result<Vec<Candidate>> {
        Ok(self.detect(text, categories))
    }
}
