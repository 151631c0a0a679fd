//! Archive housekeeping: filing past-dated logs and purging old folders.
//!
//! Every pass is per-item tolerant. A file that cannot be moved or a folder
//! that cannot be deleted is logged and recorded in the [`SweepReport`];
//! the pass moves on to the next candidate.

use chrono::{Days, NaiveDate};
use ds_common::names::LOG_EXTENSION;
use ds_config::RotationConfig;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// One item a sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a housekeeping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Items moved or deleted.
    pub processed: Vec<PathBuf>,
    /// Rotated files removed to honor `backup_count`; not part of [`count`](Self::count).
    pub pruned: Vec<PathBuf>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn count(&self) -> usize {
        self.processed.len()
    }

    fn fail(&mut self, path: &Path, error: impl ToString) {
        self.failures.push(SweepFailure {
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }

    fn merge(&mut self, other: SweepReport) {
        self.processed.extend(other.processed);
        self.pruned.extend(other.pruned);
        self.failures.extend(other.failures);
    }
}

/// A dated folder under the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFolder {
    pub name: String,
    pub path: PathBuf,
    /// `None` when the name does not match `timestamp_format`.
    pub date: Option<NaiveDate>,
    pub file_count: usize,
}

/// Delete archive folders dated strictly before `today - archive_retention_days`.
///
/// Folders whose names do not parse as dates are left alone.
pub fn cleanup_old_archives(
    archive_dir: &Path,
    config: &RotationConfig,
    today: NaiveDate,
) -> SweepReport {
    let mut report = SweepReport::default();

    let Some(cutoff) = today.checked_sub_days(Days::new(config.archive_retention_days)) else {
        return report;
    };

    let entries = match fs::read_dir(archive_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            warn!(dir = %archive_dir.display(), error = %e, "cannot list archive directory");
            report.fail(archive_dir, e);
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %archive_dir.display(), error = %e, "skipping unreadable archive entry");
                report.fail(archive_dir, e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let Some(date) = entry.file_name().to_str().and_then(|n| config.parse_date(n)) else {
            debug!(path = %path.display(), "archive folder name is not a date, skipping");
            continue;
        };

        if date >= cutoff {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(path = %path.display(), %date, "purged archive folder");
                report.processed.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to purge archive folder");
                report.fail(&path, e);
            }
        }
    }

    report
}

/// Move data-directory logs dated before `today` into their archive folders.
///
/// `active` is never touched, even when its date is in the past.
pub fn archive_past_data_files(
    data_dir: &Path,
    archive_dir: &Path,
    config: &RotationConfig,
    today: NaiveDate,
    active: &Path,
) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            warn!(dir = %data_dir.display(), error = %e, "cannot list log data directory");
            report.fail(data_dir, e);
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.fail(data_dir, e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || path == active || !has_log_extension(&path) {
            continue;
        }

        let Some(date) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| config.parse_date(stem))
        else {
            continue;
        };
        if date >= today {
            continue;
        }

        let Some(label) = config.format_date(date) else {
            report.fail(&path, "timestamp_format cannot render date");
            continue;
        };
        let folder = archive_dir.join(label);

        match file_into(&path, &folder) {
            Ok(dest) => {
                info!(from = %path.display(), to = %dest.display(), "archived past log");
                report.merge(enforce_backup_limit(&folder, config.backup_count, &dest));
                report.processed.push(dest);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to archive past log");
                report.fail(&path, e);
            }
        }
    }

    report
}

/// Move `file` into `folder` (created if needed) under a non-clashing name.
pub fn file_into(file: &Path, folder: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(folder)?;
    let name = file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let dest = unique_destination(folder, Path::new(name));
    move_file(file, &dest)?;
    Ok(dest)
}

/// Rename, or copy and remove when rename is not possible.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.exists() {
                return Err(rename_err);
            }
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// `folder/name`, or `folder/<stem>.<n>.<ext>` for the first free `n`.
pub fn unique_destination(folder: &Path, name: &Path) -> PathBuf {
    let candidate = folder.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| {
            let file_name = match &ext {
                Some(ext) => format!("{}.{}.{}", stem, n, ext),
                None => format!("{}.{}", stem, n),
            };
            folder.join(file_name)
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Keep at most `limit` files in `folder`, removing the oldest first.
/// A limit of `0` keeps everything. `keep` is never removed, even when it is
/// the oldest file in the folder.
pub fn enforce_backup_limit(folder: &Path, limit: u64, keep: &Path) -> SweepReport {
    let mut report = SweepReport::default();
    if limit == 0 {
        return report;
    }

    let mut files: Vec<(SystemTime, PathBuf)> = match fs::read_dir(folder) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .map(|p| {
                let modified = fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, p)
            })
            .collect(),
        Err(e) => {
            report.fail(folder, e);
            return report;
        }
    };

    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    if files.len() <= limit {
        return report;
    }

    let excess = files.len() - limit;
    files.retain(|(_, p)| p != keep);
    files.sort();
    for (_, path) in files.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed rotated file over backup_count");
                report.pruned.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove old rotated file");
                report.fail(&path, e);
            }
        }
    }

    report
}

/// Dated folders under `archive_dir`, sorted by name.
pub fn list_archive_folders(archive_dir: &Path, config: &RotationConfig) -> Vec<ArchiveFolder> {
    let Ok(entries) = fs::read_dir(archive_dir) else {
        return Vec::new();
    };

    let mut folders: Vec<ArchiveFolder> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let path = e.path();
            let file_count = fs::read_dir(&path)
                .map(|it| it.filter_map(|f| f.ok()).filter(|f| f.path().is_file()).count())
                .unwrap_or(0);
            ArchiveFolder {
                date: config.parse_date(&name),
                name,
                path,
                file_count,
            }
        })
        .collect();

    folders.sort_by(|a, b| a.name.cmp(&b.name));
    folders
}

fn has_log_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(LOG_EXTENSION))
}
