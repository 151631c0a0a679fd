//! Log rotation settings and their sidecar file.
//!
//! The sidecar lives in the shared config directory as
//! `rotation_config.yaml` (also `.yml` or `.json`). Loading never fails
//! loudly: a missing or unparsable file yields `None` and the caller picks
//! between defaults and the legacy single-file layout. A file that parses
//! but carries wrong field types goes through the validator, so each bad
//! field falls back to its default on its own.

use crate::document::{read_document, write_document};
use crate::validate::{sanitize_into, ConfigSchema, FieldSpec, FieldType, Schema};
use chrono::NaiveDate;
use ds_common::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Sidecar file names, in lookup order.
pub const ROTATION_CONFIG_FILES: [&str; 3] = [
    "rotation_config.yaml",
    "rotation_config.yml",
    "rotation_config.json",
];

pub const DEFAULT_MAX_SIZE_MB: f64 = 10.0;
pub const DEFAULT_ROTATION_INTERVAL_HOURS: u64 = 24;
pub const DEFAULT_ARCHIVE_RETENTION_DAYS: u64 = 30;
pub const DEFAULT_BACKUP_COUNT: u64 = 5;
pub const DEFAULT_LOG_DATA_DIR: &str = "logs/data";
pub const DEFAULT_ARCHIVE_DIR: &str = "logs/archive";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Rotation and archival settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub enabled: bool,
    /// Size threshold of the active file, in MiB.
    pub max_size_mb: f64,
    /// Age threshold of the active file; `0` turns the age trigger off.
    pub rotation_interval_hours: u64,
    /// Archive folders dated more than this many days ago are purged.
    pub archive_retention_days: u64,
    /// Rotated files kept per dated archive folder; `0` keeps all.
    pub backup_count: u64,
    /// Active-file directory, relative to the log base.
    pub log_data_dir: String,
    /// Archive root, relative to the log base.
    pub archive_dir: String,
    /// strftime pattern naming active files and archive folders.
    pub timestamp_format: String,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            rotation_interval_hours: DEFAULT_ROTATION_INTERVAL_HOURS,
            archive_retention_days: DEFAULT_ARCHIVE_RETENTION_DAYS,
            backup_count: DEFAULT_BACKUP_COUNT,
            log_data_dir: DEFAULT_LOG_DATA_DIR.to_string(),
            archive_dir: DEFAULT_ARCHIVE_DIR.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl ConfigSchema for RotationConfig {
    fn schema() -> Schema {
        Schema::new("RotationConfig")
            .field("enabled", FieldType::Bool)
            .with(FieldSpec::new("max_size_mb", FieldType::Float).gt(0.0))
            .with(FieldSpec::new("rotation_interval_hours", FieldType::Int).min(0.0))
            .with(FieldSpec::new("archive_retention_days", FieldType::Int).min(0.0))
            .with(FieldSpec::new("backup_count", FieldType::Int).min(0.0))
            .field("log_data_dir", FieldType::String)
            .field("archive_dir", FieldType::String)
            .field("timestamp_format", FieldType::String)
    }
}

impl RotationConfig {
    /// Settings with rotation turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_size_mb(mut self, mb: f64) -> Self {
        self.max_size_mb = mb;
        self
    }

    pub fn with_rotation_interval_hours(mut self, hours: u64) -> Self {
        self.rotation_interval_hours = hours;
        self
    }

    pub fn with_archive_retention_days(mut self, days: u64) -> Self {
        self.archive_retention_days = days;
        self
    }

    pub fn with_backup_count(mut self, count: u64) -> Self {
        self.backup_count = count;
        self
    }

    /// Find the sidecar file in `config_dir`, if any.
    pub fn locate(config_dir: &Path) -> Option<PathBuf> {
        ROTATION_CONFIG_FILES
            .iter()
            .map(|name| config_dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load the sidecar from `config_dir`.
    ///
    /// Returns `None` when no sidecar exists or it cannot be read or parsed.
    pub fn load(config_dir: &Path) -> Option<Self> {
        let Some(path) = Self::locate(config_dir) else {
            debug!(dir = %config_dir.display(), "no rotation config found");
            return None;
        };
        Self::load_from(&path)
    }

    /// Load a specific sidecar file; see [`RotationConfig::load`].
    pub fn load_from(path: &Path) -> Option<Self> {
        let document = match read_document(path) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable rotation config");
                return None;
            }
        };

        let (config, audit) = sanitize_into::<Self>(&document);
        let rejected = audit.iter().filter(|e| e.is_rejected()).count();
        if rejected > 0 {
            warn!(
                path = %path.display(),
                rejected,
                "rotation config fields rejected, defaults applied"
            );
        }
        Some(config)
    }

    /// Write the sidecar into `config_dir` as YAML, overwriting it.
    pub fn save(&self, config_dir: &Path) -> Result<PathBuf> {
        let path = config_dir.join(ROTATION_CONFIG_FILES[0]);
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write to an explicit path; `.json` paths are written as JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_document(path, self)?;
        debug!(path = %path.display(), "rotation config saved");
        Ok(())
    }

    /// Size threshold in bytes.
    pub fn max_size_bytes(&self) -> f64 {
        self.max_size_mb * BYTES_PER_MB
    }

    /// Age threshold, or `None` when the age trigger is off.
    pub fn rotation_interval(&self) -> Option<chrono::Duration> {
        if self.rotation_interval_hours == 0 {
            return None;
        }
        i64::try_from(self.rotation_interval_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }

    /// Render `date` with `timestamp_format`; `None` if the pattern is invalid.
    pub fn format_date(&self, date: NaiveDate) -> Option<String> {
        let mut out = String::new();
        write!(out, "{}", date.format(&self.timestamp_format)).ok()?;
        Some(out)
    }

    /// Parse a folder or file stem produced by [`RotationConfig::format_date`].
    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(text, &self.timestamp_format)
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(text, &self.timestamp_format)
                    .ok()
                    .map(|dt| dt.date())
            })
    }

    /// Semantic problems the schema cannot express.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(self.max_size_mb.is_finite() && self.max_size_mb > 0.0) {
            issues.push(format!(
                "max_size_mb must be a positive number, got {}",
                self.max_size_mb
            ));
        }

        let sample = NaiveDate::from_ymd_opt(2024, 11, 27).unwrap_or_default();
        match self.format_date(sample) {
            Some(rendered) if self.parse_date(&rendered) == Some(sample) => {
                if rendered.contains(['/', '\\']) {
                    issues.push(format!(
                        "timestamp_format {:?} produces path separators",
                        self.timestamp_format
                    ));
                }
            }
            _ => issues.push(format!(
                "timestamp_format {:?} does not encode a full calendar date",
                self.timestamp_format
            )),
        }

        for (field, value) in [
            ("log_data_dir", &self.log_data_dir),
            ("archive_dir", &self.archive_dir),
        ] {
            if !is_relative_subpath(value) {
                issues.push(format!(
                    "{} must be a relative path without '..', got {:?}",
                    field, value
                ));
            }
        }

        if self.log_data_dir == self.archive_dir {
            issues.push("log_data_dir and archive_dir must differ".to_string());
        }

        issues
    }

    /// Replace every field flagged by [`RotationConfig::issues`] with its
    /// default, returning the repaired config and the issues found.
    pub fn repaired(mut self) -> (Self, Vec<String>) {
        let issues = self.issues();
        if issues.is_empty() {
            return (self, issues);
        }

        let defaults = Self::default();
        for issue in &issues {
            if issue.starts_with("max_size_mb") {
                self.max_size_mb = defaults.max_size_mb;
            } else if issue.starts_with("timestamp_format") {
                self.timestamp_format = defaults.timestamp_format.clone();
            } else if issue.starts_with("log_data_dir and archive_dir") {
                self.log_data_dir = defaults.log_data_dir.clone();
                self.archive_dir = defaults.archive_dir.clone();
            } else if issue.starts_with("log_data_dir") {
                self.log_data_dir = defaults.log_data_dir.clone();
            } else if issue.starts_with("archive_dir") {
                self.archive_dir = defaults.archive_dir.clone();
            }
        }
        (self, issues)
    }
}

fn is_relative_subpath(value: &str) -> bool {
    let path = Path::new(value);
    !value.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
