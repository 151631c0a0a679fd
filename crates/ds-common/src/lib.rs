//! docscaffold common types.
//!
//! This crate provides foundational pieces shared by the config and root crates:
//! - The unified error type with stable codes
//! - Product naming constants (root directory, environment variables)
//! - Schema versioning for status snapshots

pub mod error;
pub mod names;
pub mod schema;

pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
