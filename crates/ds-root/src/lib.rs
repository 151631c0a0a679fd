//! docscaffold unified root.
//!
//! This crate provides:
//! - [`UnifiedRoot`]: binds an application to a shared root directory tree
//! - [`AppLogger`]: leveled application logger with file and console sinks
//! - [`RotationManager`]: size/age rotation of the active log file
//! - Archive sweeps: dated archive folders, retention purge, backup limits

pub mod archive;
pub mod bind;
pub mod logger;
pub mod rotation;

pub use bind::{RootContext, RotationMode, UnifiedRoot};
pub use logger::{init_tracing, AppLogger, ConsoleSink, FileSink, LogLevel, LogSink, SinkKind};
pub use rotation::{MaintenanceReport, RotationManager, RotationPhase, RotationStatus};
