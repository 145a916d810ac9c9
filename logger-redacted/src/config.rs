// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub log_level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}
