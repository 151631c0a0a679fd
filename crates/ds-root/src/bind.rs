//! Unified-root binding: directory tree, logger, rotation.
//!
//! ```text
//! <root>/
//!   config/                         (or override)
//!   <app_name>/                     app root
//!     logs/<app_name>.log           legacy layout (no or disabled rotation)
//!     logs/data/<date>.log          active file (rotation enabled)
//!     logs/archive/<date>/...       rotated files
//!     Report/                       (or override)
//!     <custom folders>/
//! ```
//!
//! Binding is idempotent: directories are created only when missing and the
//! logger's previous sinks are replaced, not added to. A bind that fails
//! while attaching leaves the previous sinks in place.

use crate::logger::{AppLogger, ConsoleSink, LogLevel};
use crate::rotation::{MaintenanceReport, RotationManager};
use ds_common::names::{
    CONFIG_DIR_NAME, LEGACY_LOG_DIR_NAME, LOG_EXTENSION, PRODUCT_NAME, REPORT_DIR_NAME,
};
use ds_common::{Error, Result};
use ds_config::app::is_single_component;
use ds_config::{resolve_root_dir, AppConfig, RotationConfig};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Resolved paths of a bound application. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootContext {
    app_name: String,
    root_dir: PathBuf,
    app_root: PathBuf,
    config_dir: PathBuf,
    log_base: PathBuf,
    report_dir: PathBuf,
    custom_dirs: Vec<PathBuf>,
}

impl RootContext {
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn log_base(&self) -> &Path {
        &self.log_base
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn custom_dirs(&self) -> &[PathBuf] {
        &self.custom_dirs
    }

    /// Path of a custom folder declared at bind time.
    pub fn custom_dir(&self, name: &str) -> Option<&Path> {
        self.custom_dirs
            .iter()
            .find(|p| p.file_name().is_some_and(|n| n == name))
            .map(PathBuf::as_path)
    }

    /// Legacy single-file log location.
    pub fn legacy_log_path(&self) -> PathBuf {
        self.log_base
            .join(LEGACY_LOG_DIR_NAME)
            .join(format!("{}.{}", self.app_name, LOG_EXTENSION))
    }
}

/// How logging was set up by the last bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// No usable sidecar; legacy single file.
    NoConfig,
    /// Sidecar present with `enabled: false`; legacy single file.
    Disabled,
    /// Dated active file under the data directory.
    Enabled,
}

/// Owns the logger and rotation state of one application.
#[derive(Debug)]
pub struct UnifiedRoot {
    logger: AppLogger,
    context: Option<RootContext>,
    rotation: Option<RotationManager>,
    mode: RotationMode,
}

impl Default for UnifiedRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl UnifiedRoot {
    pub fn new() -> Self {
        Self {
            logger: AppLogger::new(PRODUCT_NAME, LogLevel::default()),
            context: None,
            rotation: None,
            mode: RotationMode::NoConfig,
        }
    }

    /// Create the directory tree for `config` under `root_name` (resolved via
    /// [`resolve_root_dir`] when `None`) and attach the logger.
    ///
    /// Fails if a required path exists as a non-directory.
    pub fn bind(&mut self, config: &AppConfig, root_name: Option<&Path>) -> Result<RootContext> {
        config.validate()?;
        for name in &config.custom_folders {
            if !is_single_component(name) {
                return Err(Error::InvalidFolderName(name.clone()));
            }
        }

        let context = compute_context(config, &resolve_root_dir(root_name));

        for dir in [
            context.root_dir(),
            context.app_root(),
            context.config_dir(),
            context.log_base(),
            context.report_dir(),
        ] {
            ensure_dir(dir)?;
        }
        for dir in context.custom_dirs() {
            ensure_dir(dir)?;
        }

        let level = LogLevel::parse(&config.log_level).unwrap_or_else(|| {
            warn!(level = %config.log_level, "unknown log level, using INFO");
            LogLevel::Info
        });

        // The previous sinks stay aside until the new ones are attached, so a
        // failed re-bind leaves the old binding logging as before.
        let previous = self.logger.take_sinks();
        let (mode, rotation) = match self.attach_sinks(config, &context) {
            Ok(wired) => wired,
            Err(e) => {
                self.logger.restore_sinks(previous);
                warn!(app = %config.app_name, error = %e, "bind failed, previous log sinks kept");
                return Err(e);
            }
        };
        let detached = self.logger.release(previous);
        self.logger.configure(&config.app_name, level);

        info!(
            app = %context.app_name(),
            root = %context.root_dir().display(),
            mode = ?mode,
            replaced_sinks = detached,
            "application bound"
        );

        self.mode = mode;
        self.rotation = rotation;
        self.context = Some(context.clone());
        Ok(context)
    }

    /// Attach the file sink (rotating or legacy) and the optional console
    /// sink for `context`.
    fn attach_sinks(
        &self,
        config: &AppConfig,
        context: &RootContext,
    ) -> Result<(RotationMode, Option<RotationManager>)> {
        let (mode, rotation) = match RotationConfig::load(context.config_dir()) {
            None => (RotationMode::NoConfig, None),
            Some(rotation) if !rotation.enabled => (RotationMode::Disabled, None),
            Some(rotation) => {
                let (rotation, issues) = rotation.repaired();
                for issue in &issues {
                    warn!(issue = %issue, "rotation config issue, default applied");
                }
                let mut manager =
                    RotationManager::new(rotation, context.log_base(), self.logger.clone())?;
                manager.open_active()?;
                (RotationMode::Enabled, Some(manager))
            }
        };

        if rotation.is_none() {
            let legacy = context.legacy_log_path();
            if let Some(parent) = legacy.parent() {
                ensure_dir(parent)?;
            }
            self.logger.attach_file(&legacy)?;
        }

        if config.console_output {
            self.logger.attach(Box::new(ConsoleSink));
        }

        Ok((mode, rotation))
    }

    pub fn context(&self) -> Option<&RootContext> {
        self.context.as_ref()
    }

    pub fn logger(&self) -> &AppLogger {
        &self.logger
    }

    pub fn rotation_mode(&self) -> RotationMode {
        self.mode
    }

    pub fn rotation(&self) -> Option<&RotationManager> {
        self.rotation.as_ref()
    }

    pub fn rotation_mut(&mut self) -> Option<&mut RotationManager> {
        self.rotation.as_mut()
    }

    /// File currently receiving log writes.
    pub fn active_log_path(&self) -> Option<PathBuf> {
        match &self.rotation {
            Some(manager) => Some(manager.active_path().to_path_buf()),
            None => self.context.as_ref().map(RootContext::legacy_log_path),
        }
    }

    /// Run rotation maintenance; `None` outside [`RotationMode::Enabled`].
    pub fn maybe_rotate(&mut self) -> Option<MaintenanceReport> {
        self.rotation.as_mut().map(RotationManager::maybe_rotate)
    }
}

fn compute_context(config: &AppConfig, root: &Path) -> RootContext {
    let app_root = root.join(&config.app_name);
    let config_dir = config
        .config_dir
        .clone()
        .unwrap_or_else(|| root.join(CONFIG_DIR_NAME));
    let log_base = config.log_dir.clone().unwrap_or_else(|| app_root.clone());
    let report_dir = config
        .report_dir
        .clone()
        .unwrap_or_else(|| app_root.join(REPORT_DIR_NAME));
    let custom_dirs = config
        .custom_folders
        .iter()
        .map(|name| app_root.join(name))
        .collect();

    RootContext {
        app_name: config.app_name.clone(),
        root_dir: root.to_path_buf(),
        app_root,
        config_dir,
        log_base,
        report_dir,
        custom_dirs,
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(Error::PathConflict {
            path: path.to_path_buf(),
        });
    }
    fs::create_dir_all(path).map_err(|e| Error::io_at(path, e))
}
