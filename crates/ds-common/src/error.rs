//! Error types for docscaffold.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docscaffold operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for docscaffold.
///
/// Field-level configuration problems are not errors: the validator records
/// them as audit entries and the schema default applies. Only conditions that
/// stop an operation outright surface here.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid application name: {0:?}")]
    InvalidAppName(String),

    #[error("configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    // Binding errors (20-29)
    #[error("invalid custom folder name: {0:?}")]
    InvalidFolderName(String),

    #[error("path exists and is not a directory: {}", path.display())]
    PathConflict { path: PathBuf },

    // Rotation errors (30-39)
    #[error("log rotation failed: {0}")]
    Rotation(String),

    // I/O errors (60-69)
    #[error("I/O error at {}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidAppName(_) => 11,
            Error::ConfigNotFound { .. } => 12,
            Error::InvalidFolderName(_) => 20,
            Error::PathConflict { .. } => 21,
            Error::Rotation(_) => 30,
            Error::IoAt { .. } => 60,
            Error::Io(_) => 61,
            Error::Json(_) => 62,
            Error::Yaml(_) => 63,
        }
    }

    /// True for errors caused by a filesystem object occupying a path that
    /// must be a directory.
    pub fn is_path_conflict(&self) -> bool {
        match self {
            Error::PathConflict { .. } => true,
            Error::IoAt { source, .. } | Error::Io(source) => {
                source.kind() == std::io::ErrorKind::AlreadyExists
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(Error::InvalidFolderName("..".into()).code(), 20);
        assert_eq!(Error::Rotation("x".into()).code(), 30);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Error::io_at("/tmp/x", io).code(), 60);
    }

    #[test]
    fn io_at_display_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::io_at("/var/log/app.log", io);
        let msg = err.to_string();
        assert!(msg.contains("/var/log/app.log"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn path_conflict_detection() {
        assert!(Error::PathConflict {
            path: PathBuf::from("/x")
        }
        .is_path_conflict());
        assert!(!Error::Config("x".into()).is_path_conflict());
    }
}
