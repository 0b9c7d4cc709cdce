//! File-based configuration source.

use super::{LoadTarget, SourceLayers};
use crate::core::store::Table;
use crate::error::{ConfigError, Result};
use config::{File, FileFormat};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Loads configuration from a local YAML, JSON or TOML file.
///
/// The format is detected from the file extension:
/// - `.yaml`, `.yml` -> YAML
/// - `.json` -> JSON
/// - `.toml` -> TOML
///
/// A missing file is not an error as long as defaults were registered; the
/// store is then populated from defaults (and the environment) alone.
///
/// # Examples
///
/// ```rust,no_run
/// use strata_config::sources::{LocalConfigProvider, SourceLayers};
///
/// let provider = LocalConfigProvider::new("config/default.yaml", SourceLayers::default());
/// assert_eq!(provider.name(), "file:config/default.yaml");
/// ```
pub struct LocalConfigProvider {
    path: PathBuf,
    layers: SourceLayers,
}

impl LocalConfigProvider {
    /// Create a new file provider.
    pub fn new(path: impl Into<PathBuf>, layers: SourceLayers) -> Self {
        Self {
            path: path.into(),
            layers,
        }
    }

    /// The configured file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reset, apply defaults and environment, merge the file, bind and publish.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::SourceNotFound`] if the file is missing and no defaults exist
    /// - [`ConfigError::IoError`] if the file cannot be read
    /// - [`ConfigError::ParseError`] if the format is unknown or the content is malformed
    /// - schema binding errors, verbatim
    pub fn load<S>(&self, target: &LoadTarget<S>) -> Result<()> {
        let mut candidate = self.layers.stage();

        match self.read()? {
            Some(table) => candidate.merge(table),
            None => tracing::debug!(
                path = %self.path.display(),
                "No configuration file found, using defaults"
            ),
        }

        let keys = candidate.all_keys().len();
        target.commit(candidate)?;
        tracing::debug!(source = %self.name(), keys, "Configuration loaded");
        Ok(())
    }

    /// Read and parse the file, or `None` if it is absent but defaults exist.
    fn read(&self) -> Result<Option<Table>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return if self.layers.has_defaults() {
                    Ok(None)
                } else {
                    Err(ConfigError::SourceNotFound(self.path.clone()))
                };
            }
            Err(e) => return Err(ConfigError::IoError(e)),
        };

        let format = self.format()?;
        let table = config::Config::builder()
            .add_source(File::from_str(&content, format))
            .build()
            .map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", self.path.display(), e))
            })?
            .try_deserialize::<Table>()
            .map_err(|e| {
                ConfigError::DeserializationError(format!("Failed to parse file: {}", e))
            })?;

        Ok(Some(table))
    }

    /// Determine the file format from the extension.
    fn format(&self) -> Result<FileFormat> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::ParseError(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "json" => Ok(FileFormat::Json),
            "toml" => Ok(FileFormat::Toml),
            other => Err(ConfigError::ParseError(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                other
            ))),
        }
    }

    /// A human-readable name for logging.
    pub fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
