//! PHI de-identification for transcribed clinical handoffs
//!
//! The production path is three steps over one text:
//!
//! 1. [`CandidateFilter`] drops detector candidates below their category
//!    threshold or matching that category's deny list.
//! 2. [`RedactionEngine`] substitutes the survivors using a
//!    [`ReplacementStrategy`], with the transfer-facility category following
//!    the request's [`TransferFacilityMode`].
//! 3. [`LeakValidator`] runs the detector again on the output and reports
//!    anything identifying that is left.
//!
//! [`DeidentificationService`] wires these together behind a lazily
//! initialised [`PhiDetector`]. Detector failures fail the whole call; there
//! is never partially filtered output.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::{PhiSettings, ReplacementStrategy, TransferFacilityMode};
//! use deidentification_engine::DeidentificationService;
//!
//! # async fn run() -> error_common::Result<()> {
//! let service = DeidentificationService::new(PhiSettings::default())?;
//! let outcome = service
//!     .redact(
//!         "Mom Jessica is at bedside.",
//!         ReplacementStrategy::TypeMarker,
//!         TransferFacilityMode::Conservative,
//!     )
//!     .await?;
//! assert_eq!(outcome.redacted_text, "Mom [NAME] is at bedside.");
//! # Ok(())
//! # }
//! ```

pub mod detector;
pub mod filter;
pub mod leak_validator;
pub mod models;
pub mod redaction;
pub mod service;

pub use config_engine::{ReplacementStrategy, TransferFacilityMode};
pub use detector::{CompositeDetector, PatternRecognizer, PatternRule, PhiDetector, Recognizer};
pub use filter::{CandidateFilter, DenyList, DenyListTable};
pub use leak_validator::{known_markers, LeakReport, LeakValidator};
pub use models::*;
pub use redaction::{masked_preview, type_marker, Redaction, RedactionEngine};
pub use service::{DeidentificationService, DetectorFactory};
