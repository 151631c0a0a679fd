//! Application configuration consumed by the unified-root binder.

use crate::document::read_document;
use crate::validate::{sanitize_into, AuditEntry, ConfigSchema, FieldType, Schema};
use ds_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Per-application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application folder name under the root. Required.
    pub app_name: String,

    pub log_level: String,

    /// Mirror log records to stderr.
    pub console_output: bool,

    /// Overrides the log base (default: the application root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Overrides `<app_root>/Report`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,

    /// Overrides `<root>/config`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,

    /// Extra folders created under the application root.
    pub custom_folders: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            console_output: false,
            log_dir: None,
            report_dir: None,
            config_dir: None,
            custom_folders: Vec::new(),
        }
    }
}

impl ConfigSchema for AppConfig {
    fn schema() -> Schema {
        Schema::new("AppConfig")
            .field("app_name", FieldType::String)
            .field("log_level", FieldType::String)
            .field("console_output", FieldType::Bool)
            .field("log_dir", FieldType::optional(FieldType::String))
            .field("report_dir", FieldType::optional(FieldType::String))
            .field("config_dir", FieldType::optional(FieldType::String))
            .field("custom_folders", FieldType::list(FieldType::String))
    }
}

impl AppConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_console_output(mut self, enabled: bool) -> Self {
        self.console_output = enabled;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn with_custom_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_folders = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Build from an untyped tree; bad fields take their defaults.
    pub fn from_value(value: &Value) -> (Self, Vec<AuditEntry>) {
        sanitize_into::<Self>(value)
    }

    /// Load from a YAML or JSON file and check the result.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let document = read_document(path)?;
        let (config, audit) = Self::from_value(&document);
        for entry in audit.iter().filter(|e| e.is_rejected()) {
            warn!(
                path = %path.display(),
                field = %entry.path,
                "app config field rejected, default applied"
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the fields the binder cannot default.
    pub fn validate(&self) -> Result<()> {
        let name = self.app_name.trim();
        if name.is_empty() || name != self.app_name || !is_single_component(name) {
            return Err(Error::InvalidAppName(self.app_name.clone()));
        }
        Ok(())
    }
}

/// True when `name` is usable as exactly one directory name.
pub fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn builder_sets_fields() {
        let config = AppConfig::new("reporter")
            .with_log_level("DEBUG")
            .with_console_output(true)
            .with_report_dir("/tmp/reports")
            .with_custom_folders(["data", "cache"]);
        assert_eq!(config.app_name, "reporter");
        assert_eq!(config.log_level, "DEBUG");
        assert!(config.console_output);
        assert_eq!(config.report_dir, Some(PathBuf::from("/tmp/reports")));
        assert_eq!(config.custom_folders, vec!["data", "cache"]);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn from_value_defaults_bad_log_level() {
        let (config, audit) = AppConfig::from_value(&json!({"app_name": "x", "log_level": 123}));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(audit.iter().filter(|e| e.is_rejected()).count(), 1);
    }

    #[test]
    fn from_file_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.yaml");
        fs::write(
            &path,
            "app_name: reporter\nlog_dir: null\ncustom_folders: [data, cache]\nconsole_output: 7\n",
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.app_name, "reporter");
        assert_eq!(config.custom_folders, vec!["data", "cache"]);
        assert!(!config.console_output);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn from_file_missing() {
        let err = AppConfig::from_file(Path::new("/no/such/app.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn from_file_without_name_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.json");
        fs::write(&path, r#"{"app_name": 42}"#).unwrap();
        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidAppName(_)));
    }

    #[test]
    fn app_name_rules() {
        assert!(AppConfig::new("ok_name").validate().is_ok());
        for bad in ["", "   ", " padded", "a/b", "..", "."] {
            assert!(AppConfig::new(bad).validate().is_err(), "{bad:?}");
        }
    }
}
