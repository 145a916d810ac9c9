//! HIPAA-compliant logging setup for the PHI engines
//!
//! Transcript text must never reach a log sink. The engines reference text
//! through [`PiiRedactor::fingerprint`] (a short SHA-256 digest that allows
//! correlating log lines for the same input) and pass any free-form message
//! produced by an external collaborator through [`PiiRedactor::scrub`] first.
//!
//! # Example
//!
//! ```rust
//! use logger_redacted::{init_logging, LoggerConfig, PiiRedactor};
//!
//! init_logging(&LoggerConfig::default()).ok();
//!
//! let redactor = PiiRedactor::default();
//! tracing::info!(
//!     text_id = %redactor.fingerprint("Mom Jessica is at bedside."),
//!     "Redaction requested"
//! );
//! ```

pub mod config;
pub mod redactor;

pub use config::*;
pub use redactor::*;

use error_common::{PhiError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over [`LoggerConfig::log_level`]. Calling this
/// twice returns a configuration error instead of panicking.
pub fn init_logging(config: &LoggerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| PhiError::configuration(format!("invalid log filter: {e}")))?;

    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json_output {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| PhiError::configuration(format!("logger already initialised: {e}")))
}
