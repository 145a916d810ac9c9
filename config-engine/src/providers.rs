// Settings sources: built-in defaults, an optional file, then the environment
use crate::error::Result;
use crate::settings::PhiSettings;
use config::{Config, Environment, File, FileFormat};
use std::path::PathBuf;

/// Environment prefix; `PHI__EVALUATION__DEPLOY_THRESHOLD=0.97` sets
/// `evaluation.deploy_threshold`
pub const ENV_PREFIX: &str = "PHI";

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Inline { contents: String, format: FileFormat },
}

/// Builds [`PhiSettings`] from layered sources.
///
/// Later sources override earlier ones: defaults, then the file, then
/// `PHI__`-prefixed environment variables (after `.env` is read).
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<FileSource>,
    use_env: bool,
    load_dotenv: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            use_env: true,
            load_dotenv: true,
        }
    }

    /// YAML, JSON or TOML file, chosen by extension
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(FileSource::Path(path.into()));
        self
    }

    /// In-memory YAML document, e.g. a persisted optimal-threshold table
    #[must_use]
    pub fn with_yaml(mut self, contents: impl Into<String>) -> Self {
        self.file = Some(FileSource::Inline {
            contents: contents.into(),
            format: FileFormat::Yaml,
        });
        self
    }

    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self.load_dotenv = false;
        self
    }

    /// Merge all sources, normalise category keys and validate.
    ///
    /// # Errors
    ///
    /// [`crate::ConfigError::Load`] when a source is unreadable or does not
    /// deserialize, [`crate::ConfigError::Validation`] when the merged tables
    /// are out of range.
    pub fn load(&self) -> Result<PhiSettings> {
        if self.load_dotenv {
            if let Ok(path) = dotenvy::dotenv() {
                tracing::debug!(path = %path.display(), "Loaded .env file");
            }
        }

        let mut builder = Config::builder().add_source(Config::try_from(&PhiSettings::default())?);

        match &self.file {
            Some(FileSource::Path(path)) => {
                tracing::info!(path = %path.display(), "Loading settings file");
                builder = builder.add_source(File::from(path.as_path()).required(true));
            }
            Some(FileSource::Inline { contents, format }) => {
                builder = builder.add_source(File::from_str(contents, *format));
            }
            None => {}
        }

        if self.use_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("phi_entities")
                    .with_list_parse_key("calibration.sweep_thresholds"),
            );
        }

        let mut settings: PhiSettings = builder.build()?.try_deserialize()?;
        settings.normalize_categories();
        settings.validate()?;

        tracing::info!(
            categories = settings.phi_entities.len(),
            deny_lists = settings.deny_lists.len(),
            default_threshold = settings.thresholds.default_threshold,
            facility_mode = ?settings.redaction.transfer_facility_mode,
            "Settings loaded"
        );

        Ok(settings)
    }
}
