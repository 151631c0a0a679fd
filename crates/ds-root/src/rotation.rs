//! Size/age-triggered rotation of the active log file.
//!
//! # Layout
//! ```text
//! <log_base>/<log_data_dir>/<date>.log          active file
//! <log_base>/<archive_dir>/<date>/<name>.log    rotated files
//! ```
//!
//! # States
//! ```text
//! ACTIVE ──should_rotate()──▶ ROTATING ──new file attached──▶ ACTIVE
//! ```
//! Rotation moves the active file into today's archive folder, creates an
//! empty file at the canonical path, and re-attaches the logger's file sink.
//! Purging old archive folders is a separate pass ([`RotationManager::cleanup_old_archives`]).

use crate::archive::{
    archive_past_data_files, cleanup_old_archives, enforce_backup_limit, file_into,
    list_archive_folders, ArchiveFolder,
};
use crate::logger::AppLogger;
use chrono::{DateTime, Local, NaiveDate};
use ds_common::names::LOG_EXTENSION;
use ds_common::{Error, Result, SCHEMA_VERSION};
use ds_config::RotationConfig;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Phase of the active log artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    Active,
    Rotating,
}

/// Outcome of one [`RotationManager::maybe_rotate`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// The active file moved to a new calendar day's path.
    pub day_rolled: bool,
    /// Archive path of the rotated file, if a rotation happened.
    pub rotated: Option<PathBuf>,
    /// Past-dated data files filed into the archive.
    pub archived: usize,
    /// Archive folders purged by retention.
    pub purged: usize,
    pub errors: Vec<String>,
}

/// Serializable view of the rotation state.
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub schema_version: String,
    pub enabled: bool,
    pub phase: RotationPhase,
    pub active_file: PathBuf,
    pub active_size_bytes: u64,
    pub active_since: String,
    pub max_size_bytes: f64,
    pub archive_dir: PathBuf,
    pub archive_folders: Vec<ArchiveFolder>,
}

/// Owns the active log file of one bound application.
#[derive(Debug)]
pub struct RotationManager {
    config: RotationConfig,
    data_dir: PathBuf,
    archive_dir: PathBuf,
    active_path: PathBuf,
    active_since: DateTime<Local>,
    phase: RotationPhase,
    logger: AppLogger,
}

impl RotationManager {
    /// Create the data and archive directories under `log_base`.
    ///
    /// `config` should already be free of [`RotationConfig::issues`]; an
    /// unusable `timestamp_format` is reported here as an error.
    pub fn new(config: RotationConfig, log_base: &Path, logger: AppLogger) -> Result<Self> {
        let data_dir = log_base.join(&config.log_data_dir);
        let archive_dir = log_base.join(&config.archive_dir);
        for dir in [&data_dir, &archive_dir] {
            fs::create_dir_all(dir).map_err(|e| Error::io_at(dir, e))?;
        }

        let now = Local::now();
        let active_path = active_file_path(&data_dir, &config, now.date_naive())?;

        Ok(Self {
            config,
            data_dir,
            archive_dir,
            active_path,
            active_since: now,
            phase: RotationPhase::Active,
            logger,
        })
    }

    /// Ensure today's active file exists and attach it to the logger,
    /// replacing any file sink already attached.
    pub fn open_active(&mut self) -> Result<()> {
        let path = self.active_path.clone();
        self.switch_active(path, Local::now())
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    pub fn active_since(&self) -> DateTime<Local> {
        self.active_since
    }

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    /// Canonical active-file path for the calendar day of `now`.
    pub fn canonical_path_at(&self, now: DateTime<Local>) -> Result<PathBuf> {
        active_file_path(&self.data_dir, &self.config, now.date_naive())
    }

    /// Size of the active file in bytes; `0` when it does not exist.
    pub fn active_size(&self) -> u64 {
        fs::metadata(&self.active_path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn should_rotate(&self) -> bool {
        self.should_rotate_at(Local::now())
    }

    /// True when rotation is enabled and the active file has reached the
    /// size threshold or the age threshold.
    pub fn should_rotate_at(&self, now: DateTime<Local>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let size = self.active_size();
        if size as f64 >= self.config.max_size_bytes() {
            debug!(size, path = %self.active_path.display(), "rotation due: size");
            return true;
        }

        if let Some(interval) = self.config.rotation_interval() {
            if now.signed_duration_since(self.active_since) >= interval {
                debug!(path = %self.active_path.display(), "rotation due: age");
                return true;
            }
        }

        false
    }

    pub fn rotate_logs(&mut self) -> Result<Option<PathBuf>> {
        self.rotate_logs_at(Local::now())
    }

    /// Move the active file into `<archive_dir>/<date of now>/` and start a
    /// fresh one at the canonical path.
    ///
    /// Returns the archived path, or `None` if there was no active file to
    /// move. If the move fails the logger is re-attached to the old file.
    pub fn rotate_logs_at(&mut self, now: DateTime<Local>) -> Result<Option<PathBuf>> {
        self.phase = RotationPhase::Rotating;
        let result = self.rotate_inner(now);
        self.phase = RotationPhase::Active;
        result
    }

    fn rotate_inner(&mut self, now: DateTime<Local>) -> Result<Option<PathBuf>> {
        let today = now.date_naive();
        let label = self
            .config
            .format_date(today)
            .ok_or_else(|| invalid_format(&self.config))?;
        let folder = self.archive_dir.join(label);
        let canonical = self.canonical_path_at(now)?;

        self.logger.detach_files();

        let archived = if self.active_path.exists() {
            match file_into(&self.active_path, &folder) {
                Ok(dest) => {
                    let pruned = enforce_backup_limit(&folder, self.config.backup_count, &dest);
                    for failure in &pruned.failures {
                        warn!(path = %failure.path.display(), error = %failure.error, "backup limit not enforced");
                    }
                    Some(dest)
                }
                Err(e) => {
                    let path = self.active_path.clone();
                    if let Err(reattach) = self.logger.attach_file(&path) {
                        error!(error = %reattach, "failed to re-attach active log after failed rotation");
                    }
                    return Err(Error::io_at(path, e));
                }
            }
        } else {
            None
        };

        let opened = File::create(&canonical)
            .map_err(|e| Error::io_at(&canonical, e))
            .and_then(|_| self.logger.attach_file(&canonical));
        if let Err(e) = opened {
            let previous = self.active_path.clone();
            self.recover_sink(&[canonical, previous], now);
            return Err(e);
        }
        self.active_path = canonical;
        self.active_since = now;

        match &archived {
            Some(dest) => info!(
                archived = %dest.display(),
                active = %self.active_path.display(),
                "log rotated"
            ),
            None => info!(active = %self.active_path.display(), "log rotated, no prior file"),
        }
        Ok(archived)
    }

    pub fn archive_old_logs_from_data(&self) -> usize {
        self.archive_old_logs_from_data_at(Local::now().date_naive())
    }

    /// File data-directory logs dated before `today` into their archive
    /// folders. Returns the number moved.
    pub fn archive_old_logs_from_data_at(&self, today: NaiveDate) -> usize {
        let report = archive_past_data_files(
            &self.data_dir,
            &self.archive_dir,
            &self.config,
            today,
            &self.active_path,
        );
        if !report.failures.is_empty() {
            warn!(failed = report.failures.len(), "some past logs were not archived");
        }
        report.count()
    }

    pub fn cleanup_old_archives(&self) -> usize {
        self.cleanup_old_archives_at(Local::now().date_naive())
    }

    /// Delete archive folders outside the retention window. Returns the
    /// number of folders removed.
    pub fn cleanup_old_archives_at(&self, today: NaiveDate) -> usize {
        let report = cleanup_old_archives(&self.archive_dir, &self.config, today);
        if !report.failures.is_empty() {
            warn!(failed = report.failures.len(), "some archive folders were not purged");
        }
        report.count()
    }

    pub fn maybe_rotate(&mut self) -> MaintenanceReport {
        self.maybe_rotate_at(Local::now())
    }

    /// Periodic maintenance: follow a day change, rotate if due, archive
    /// past-dated files, purge expired archives.
    pub fn maybe_rotate_at(&mut self, now: DateTime<Local>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        if !self.config.enabled {
            return report;
        }

        match self.canonical_path_at(now) {
            Ok(canonical) if canonical != self.active_path => {
                match self.switch_active(canonical, now) {
                    Ok(()) => report.day_rolled = true,
                    Err(e) => {
                        error!(error = %e, "failed to open new day's log file");
                        report.errors.push(e.to_string());
                    }
                }
            }
            Ok(_) => {}
            Err(e) => report.errors.push(e.to_string()),
        }

        if self.should_rotate_at(now) {
            match self.rotate_logs_at(now) {
                Ok(archived) => report.rotated = archived,
                Err(e) => {
                    error!(error = %e, "log rotation failed");
                    report.errors.push(e.to_string());
                }
            }
        }

        let today = now.date_naive();
        report.archived = self.archive_old_logs_from_data_at(today);
        report.purged = self.cleanup_old_archives_at(today);
        report
    }

    /// Snapshot for reporting.
    pub fn status(&self) -> RotationStatus {
        RotationStatus {
            schema_version: SCHEMA_VERSION.to_string(),
            enabled: self.config.enabled,
            phase: self.phase,
            active_file: self.active_path.clone(),
            active_size_bytes: self.active_size(),
            active_since: self.active_since.to_rfc3339(),
            max_size_bytes: self.config.max_size_bytes(),
            archive_dir: self.archive_dir.clone(),
            archive_folders: list_archive_folders(&self.archive_dir, &self.config),
        }
    }

    /// After a failed rotation, attach the first of `candidates` that can be
    /// append-opened so records are not dropped. `active_path` follows it.
    fn recover_sink(&mut self, candidates: &[PathBuf], now: DateTime<Local>) {
        for path in candidates {
            match self.logger.attach_file(path) {
                Ok(()) => {
                    warn!(path = %path.display(), "rotation failed, logging continues here");
                    if self.active_path != *path {
                        self.active_path = path.clone();
                        self.active_since = now;
                    }
                    return;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot attach log file");
                }
            }
        }
        error!("no log file attached after failed rotation");
    }

    /// Point the logger at `path`, creating the file if absent. The previous
    /// file stays where it is.
    fn switch_active(&mut self, path: PathBuf, now: DateTime<Local>) -> Result<()> {
        self.logger.detach_files();
        self.logger.attach_file(&path)?;
        self.active_since = file_created(&path).unwrap_or(now);
        debug!(path = %path.display(), "active log attached");
        self.active_path = path;
        Ok(())
    }
}

fn active_file_path(data_dir: &Path, config: &RotationConfig, date: NaiveDate) -> Result<PathBuf> {
    let label = config
        .format_date(date)
        .ok_or_else(|| invalid_format(config))?;
    Ok(data_dir.join(format!("{}.{}", label, LOG_EXTENSION)))
}

fn file_created(path: &Path) -> Option<DateTime<Local>> {
    fs::metadata(path)
        .and_then(|m| m.created())
        .ok()
        .map(DateTime::<Local>::from)
}

fn invalid_format(config: &RotationConfig) -> Error {
    Error::Rotation(format!(
        "timestamp_format {:?} cannot render a date",
        config.timestamp_format
    ))
}
