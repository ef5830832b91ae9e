//! Configuration management for the alerting pipeline
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::AlertError;
use crate::gate::MarkerPolicy;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where meteogram exports are found
    #[serde(default)]
    pub source: SourceConfig,
    /// Threshold rule table
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    /// Control marker storage and policy
    #[serde(default)]
    pub control: ControlConfig,
    /// Alert export settings
    #[serde(default)]
    pub export: ExportConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Meteogram source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding the downloaded exports
    #[serde(default = "default_source_directory")]
    pub directory: String,
    /// File name prefix before the run date
    #[serde(default = "default_source_prefix")]
    pub prefix: String,
    /// File name suffix after the run date
    #[serde(default = "default_source_suffix")]
    pub suffix: String,
}

/// Threshold table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Path of the CSV rule table
    #[serde(default = "default_thresholds_path")]
    pub path: String,
}

/// Control marker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Directory holding the marker files
    #[serde(default = "default_control_directory")]
    pub directory: String,
    /// Whether failed runs keep their marker
    #[serde(default)]
    pub policy: MarkerPolicy,
}

/// Alert export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Path of the JSON alert file
    #[serde(default = "default_export_path")]
    pub path: String,
    /// IANA timezone for the local reference date and time of records
    #[serde(default = "default_export_timezone")]
    pub timezone: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_source_directory() -> String {
    "data".to_string()
}

fn default_source_prefix() -> String {
    "HST".to_string()
}

fn default_source_suffix() -> String {
    "00-MeteogramASC.out".to_string()
}

fn default_thresholds_path() -> String {
    "config/thresholds.csv".to_string()
}

fn default_control_directory() -> String {
    "control".to_string()
}

fn default_export_path() -> String {
    "alerts/alerts.json".to_string()
}

fn default_export_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: default_source_directory(),
            prefix: default_source_prefix(),
            suffix: default_source_suffix(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            path: default_thresholds_path(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            directory: default_control_directory(),
            policy: MarkerPolicy::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
            timezone: default_export_timezone(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SourceConfig {
    /// Export file name for a run date, e.g. `HST2024010100-MeteogramASC.out`
    #[must_use]
    pub fn file_name_for(&self, date: NaiveDate) -> String {
        format!("{}{}{}", self.prefix, date.format("%Y%m%d"), self.suffix)
    }

    /// Run date encoded in an export file name, if the name matches the pattern
    #[must_use]
    pub fn date_of(&self, file_name: &str) -> Option<NaiveDate> {
        let date = file_name
            .strip_prefix(&self.prefix)?
            .strip_suffix(&self.suffix)?;
        if date.len() != 8 {
            return None;
        }
        NaiveDate::parse_from_str(date, "%Y%m%d").ok()
    }

    /// Most recently modified export in the source directory
    pub fn locate_latest(&self) -> Result<Option<PathBuf>> {
        let dir = Path::new(&self.directory);
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read source directory {}", dir.display()))?;

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if self.date_of(name).is_none() {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified()?;
            debug!("Found meteogram export {} ({:?})", name, modified);
            if latest.as_ref().is_none_or(|(best, _)| modified > *best) {
                latest = Some((modified, entry.path()));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

impl ExportConfig {
    /// Parsed export timezone
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            anyhow::Error::from(AlertError::config(format!(
                "Unknown timezone '{}'",
                self.timezone
            )))
        })
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides, e.g. METEOALERT__CONTROL__POLICY=success_only
        builder = builder.add_source(
            Environment::with_prefix("METEOALERT")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("meteoalert").join("config.toml"))
    }

    /// Apply default values to empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.source.directory.is_empty() {
            self.source.directory = default_source_directory();
        }
        if self.source.suffix.is_empty() {
            self.source.suffix = default_source_suffix();
        }
        if self.thresholds.path.is_empty() {
            self.thresholds.path = default_thresholds_path();
        }
        if self.control.directory.is_empty() {
            self.control.directory = default_control_directory();
        }
        if self.export.path.is_empty() {
            self.export.path = default_export_path();
        }
        if self.export.timezone.is_empty() {
            self.export.timezone = default_export_timezone();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_string_values()?;
        self.export.timezone()?;
        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(AlertError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(AlertError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if self.source.prefix.contains(['/', '\\']) || self.source.suffix.contains(['/', '\\']) {
            return Err(
                AlertError::config("Source file prefix and suffix cannot contain path separators")
                    .into(),
            );
        }

        Ok(())
    }
}
