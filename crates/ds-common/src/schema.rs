//! Schema versioning for persisted and reported JSON.

/// Current schema version for status snapshots.
///
/// MAJOR bumps on field removals or type changes, MINOR on additive fields.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Check if a schema version shares the current major version.
pub fn is_compatible(version: &str) -> bool {
    major(SCHEMA_VERSION) == major(version)
}

fn major(version: &str) -> Option<u32> {
    version.split('.').next().and_then(|s| s.parse::<u32>().ok())
}
