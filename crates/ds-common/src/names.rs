//! Product naming shared by every crate.

/// Product name; prefixes the default hidden root directory.
pub const PRODUCT_NAME: &str = "docscaffold";

/// Default root directory, resolved relative to the working directory.
pub const DEFAULT_ROOT_DIR: &str = ".docscaffold_root";

/// Environment variable overriding the root directory.
pub const ENV_ROOT_DIR: &str = "DOCSCAFFOLD_ROOT";

/// Shared configuration directory under the root.
pub const CONFIG_DIR_NAME: &str = "config";

/// Report directory under the application root.
pub const REPORT_DIR_NAME: &str = "Report";

/// Legacy log directory under the application root.
pub const LEGACY_LOG_DIR_NAME: &str = "logs";

/// Extension used for every log file.
pub const LOG_EXTENSION: &str = "log";
