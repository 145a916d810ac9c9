use error_common::{codes, PhiError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid settings: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Failed to render threshold table: {0}")]
    Render(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => codes::configuration::LOAD_FAILED,
            Self::Validation(_) | Self::Render(_) => codes::configuration::INVALID_TABLE,
        }
    }
}

impl From<ConfigError> for PhiError {
    fn from(err: ConfigError) -> Self {
        PhiError::configuration(format!("[{}] {err}", err.code()))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
