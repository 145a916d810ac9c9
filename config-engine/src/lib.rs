//! Configuration for the PHI redaction and validation engines
//!
//! One [`PhiSettings`] document holds every tunable the engines consume:
//! - Per-category confidence thresholds with a fallback
//! - Deny lists, each with an explicit matching mode
//! - The ground-truth/candidate category compatibility map
//! - Frequency and risk weight maps for the weighted metrics
//! - Evaluation, bootstrap and calibration parameters
//!
//! Settings are loaded once at startup and validated before use; malformed
//! tables are a fatal configuration error.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::SettingsLoader;
//!
//! let settings = SettingsLoader::new().with_file("phi.yaml").load()?;
//! assert!(settings.thresholds.threshold_for("PERSON") <= 1.0);
//! # Ok::<(), config_engine::ConfigError>(())
//! ```

pub mod error;
pub mod providers;
pub mod settings;
pub mod validation;

pub use error::*;
pub use providers::*;
pub use settings::*;
