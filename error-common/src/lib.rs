//! Common error handling for the PHI de-identification workspace
//!
//! Every crate in the workspace reports failures through the taxonomy defined
//! here so that the production redaction path and the offline validation path
//! agree on what is fatal and what is recoverable.
//!
//! # Error Categories
//!
//! - **Configuration**: malformed threshold or deny-list tables, fatal at load
//! - **DetectorUnavailable**: detector initialisation failure or timeout, fatal per request
//! - **DataIntegrity**: a corpus item whose annotations do not fit its text,
//!   excluded from metrics with a warning
//! - **InsufficientSample**: too few ground-truth instances to calibrate a category
//! - **ExclusionLimitExceeded**: so many corpus items were excluded that the run
//!   cannot be trusted
//!
//! # Example
//!
//! ```rust
//! use error_common::{PhiError, Result};
//!
//! fn threshold(value: f64) -> Result<f64> {
//!     if !(0.0..=1.0).contains(&value) {
//!         return Err(PhiError::configuration(format!(
//!             "threshold {value} outside [0, 1]"
//!         )));
//!     }
//!     Ok(value)
//! }
//!
//! let err = threshold(1.5).unwrap_err();
//! assert!(err.is_fatal());
//! assert_eq!(err.code(), error_common::codes::configuration::INVALID_TABLE);
//! ```

pub mod codes;
pub mod types;

pub use types::*;
