//! docscaffold configuration loading and validation.
//!
//! This crate provides:
//! - A schema-driven validator that sanitizes untrusted config trees and
//!   records an audit log instead of failing
//! - Typed application and rotation settings built on top of it
//! - YAML/JSON document helpers
//! - Root directory resolution (argument → env → default)

pub mod app;
pub mod document;
pub mod resolve;
pub mod rotation;
pub mod validate;

pub use app::AppConfig;
pub use document::DocumentFormat;
pub use resolve::resolve_root_dir;
pub use rotation::RotationConfig;
pub use validate::{
    sanitize_into, AuditEntry, AuditOutcome, ConfigSchema, FieldSpec, FieldType, RejectReason,
    Schema, Validator,
};
