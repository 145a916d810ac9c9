use crate::detector::{CompositeDetector, PhiDetector};
use crate::filter::CandidateFilter;
use crate::leak_validator::LeakValidator;
use crate::models::{Candidate, RedactionOutcome};
use crate::redaction::RedactionEngine;
use config_engine::{PhiSettings, ReplacementStrategy, TransferFacilityMode};
use error_common::{PhiError, Result};
use logger_redacted::PiiRedactor;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Builds the detector on first use
pub type DetectorFactory = Arc<dyn Fn() -> Result<Arc<dyn PhiDetector>> + Send + Sync>;

/// Production redaction pipeline: detect, filter, redact, re-check.
///
/// The detector is constructed at most once, on first use, even under
/// concurrent first calls. Filter tables are an immutable snapshot swapped
/// wholesale by [`DeidentificationService::replace_tables`]; a request keeps
/// the snapshot it started with.
pub struct DeidentificationService {
    settings: PhiSettings,
    detector: OnceCell<Arc<dyn PhiDetector>>,
    factory: DetectorFactory,
    filter: RwLock<Arc<CandidateFilter>>,
    engine: RedactionEngine,
    redactor: PiiRedactor,
}

impl DeidentificationService {
    /// Service backed by the built-in composite detector.
    ///
    /// # Errors
    ///
    /// `Configuration` if the deny lists fail to compile.
    pub fn new(settings: PhiSettings) -> Result<Self> {
        let recognizers = settings.recognizers.clone();
        let factory: DetectorFactory = Arc::new(move || -> Result<Arc<dyn PhiDetector>> {
            let detector = CompositeDetector::with_builtin(&recognizers)?;
            Ok(Arc::new(detector) as Arc<dyn PhiDetector>)
        });
        Self::with_factory(settings, factory)
    }

    /// Service backed by an already constructed detector
    ///
    /// # Errors
    ///
    /// `Configuration` if the deny lists fail to compile.
    pub fn with_detector(settings: PhiSettings, detector: Arc<dyn PhiDetector>) -> Result<Self> {
        let factory: DetectorFactory =
            Arc::new(move || -> Result<Arc<dyn PhiDetector>> { Ok(Arc::clone(&detector)) });
        Self::with_factory(settings, factory)
    }

    /// Service whose detector is built lazily by `factory`
    ///
    /// # Errors
    ///
    /// `Configuration` if the deny lists fail to compile.
    pub fn with_factory(settings: PhiSettings, factory: DetectorFactory) -> Result<Self> {
        let filter = CandidateFilter::from_settings(&settings)?;
        let engine = RedactionEngine::new(settings.redaction.transfer_facility_category.clone());
        Ok(Self {
            settings,
            detector: OnceCell::new(),
            factory,
            filter: RwLock::new(Arc::new(filter)),
            engine,
            redactor: PiiRedactor::default(),
        })
    }

    pub fn settings(&self) -> &PhiSettings {
        &self.settings
    }

    pub fn is_detector_loaded(&self) -> bool {
        self.detector.initialized()
    }

    /// Current filter snapshot
    pub fn filter(&self) -> Arc<CandidateFilter> {
        Arc::clone(&self.filter.read())
    }

    /// Swap in new threshold and deny-list tables, e.g. calibration output
    pub fn replace_tables(&self, filter: CandidateFilter) {
        *self.filter.write() = Arc::new(filter);
        info!("Filter tables replaced");
    }

    /// Build the detector now instead of on the first request.
    ///
    /// # Errors
    ///
    /// `DetectorUnavailable` if construction fails.
    pub async fn warm_up(&self) -> Result<()> {
        self.detector().await.map(|_| ())
    }

    async fn detector(&self) -> Result<Arc<dyn PhiDetector>> {
        let detector = self
            .detector
            .get_or_try_init(|| async {
                info!("Initialising PHI detector");
                (self.factory)().map_err(|e| {
                    PhiError::detector_unavailable(format!(
                        "initialisation failed: {}",
                        self.redactor.scrub(&e.to_string())
                    ))
                })
            })
            .await?;
        Ok(Arc::clone(detector))
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = Duration::from_millis(self.settings.redaction.detector_timeout_ms);
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(PhiError::DetectorUnavailable(message))) => {
                Err(PhiError::DetectorUnavailable(message))
            }
            Ok(Err(other)) => Err(PhiError::detector_unavailable(
                self.redactor.scrub(&other.to_string()),
            )),
            Err(_) => Err(PhiError::detector_unavailable(format!(
                "detector call exceeded {} ms",
                limit.as_millis()
            ))),
        }
    }

    fn check_candidates(text: &str, candidates: &[Candidate]) -> Result<()> {
        for candidate in candidates {
            candidate.span.check_bounds(text).map_err(|reason| {
                PhiError::detector_unavailable(format!(
                    "{} candidate rejected: {reason}",
                    candidate.category
                ))
            })?;
        }
        Ok(())
    }

    /// Redact identifying text and re-check the result.
    ///
    /// Fails closed: any detector failure, timeout or malformed candidate
    /// returns an error and no text.
    ///
    /// # Errors
    ///
    /// `DetectorUnavailable` on detector initialisation failure, timeout,
    /// error, or out-of-bounds candidate offsets.
    pub async fn redact(
        &self,
        text: &str,
        strategy: ReplacementStrategy,
        facility_mode: TransferFacilityMode,
    ) -> Result<RedactionOutcome> {
        let text_id = self.redactor.fingerprint(text);
        let detector = self.detector().await?;
        let filter = self.filter();
        let categories = &self.settings.phi_entities;

        let raw = self
            .bounded(detector.text_to_candidates(text, categories))
            .await
            .inspect_err(|e| warn!(text_id = %text_id, error = %e, "Detection failed"))?;
        Self::check_candidates(text, &raw)?;

        let survivors = filter.filter(raw);
        let mut entity_counts: BTreeMap<String, usize> = BTreeMap::new();
        for candidate in &survivors {
            *entity_counts.entry(candidate.category.clone()).or_default() += 1;
        }
        debug!(text_id = %text_id, survivors = survivors.len(), "Candidates filtered");

        let redaction = self.engine.apply(text, &survivors, strategy, facility_mode);

        let mut validator = LeakValidator::new(detector, filter, categories.clone());
        if facility_mode == TransferFacilityMode::Clinical {
            validator =
                validator.with_exempt_category(self.settings.redaction.transfer_facility_category.clone());
        }
        let report = self
            .bounded(validator.validate(text, &redaction.text, &redaction.markers))
            .await?;

        info!(
            text_id = %text_id,
            entities = survivors.len(),
            is_safe = report.is_safe,
            strategy = ?strategy,
            facility_mode = ?facility_mode,
            "De-identification complete"
        );

        Ok(RedactionOutcome {
            redacted_text: redaction.text,
            applied_spans: redaction.applied_spans,
            is_safe: report.is_safe,
            warnings: report.warnings,
            entity_counts,
        })
    }

    /// Redact with the configured default strategy and facility mode
    ///
    /// # Errors
    ///
    /// See [`DeidentificationService::redact`].
    pub async fn redact_with_defaults(&self, text: &str) -> Result<RedactionOutcome> {
        self.redact(
            text,
            self.settings.redaction.default_strategy,
            self.settings.redaction.transfer_facility_mode,
        )
        .await
    }
}
