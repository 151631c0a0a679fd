//! Root directory resolution.
//!
//! Order: explicit argument → `DOCSCAFFOLD_ROOT` → `./.docscaffold_root`.

use ds_common::names::{DEFAULT_ROOT_DIR, ENV_ROOT_DIR};
use std::path::{Path, PathBuf};

/// Resolve the root directory from the argument or the environment.
pub fn resolve_root_dir(explicit: Option<&Path>) -> PathBuf {
    resolve_root_dir_with(explicit, std::env::var(ENV_ROOT_DIR).ok())
}

/// Resolution with the environment value supplied by the caller.
pub fn resolve_root_dir_with(explicit: Option<&Path>, env_value: Option<String>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    if let Some(dir) = env_value.filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(dir);
    }

    PathBuf::from(".").join(DEFAULT_ROOT_DIR)
}
