//! Per-application logger with an owned list of sinks.
//!
//! Each bound application gets one [`AppLogger`] handle instead of a
//! name-keyed global registry. The handle is cheap to clone; every clone
//! shares the same sink list, so the binder and the rotation manager can
//! swap the file sink while application code keeps logging.
//!
//! The logger also implements [`MakeWriter`], which lets `tracing` output be
//! routed into the active log file (see [`init_tracing`]).

use chrono::Local;
use ds_common::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Timestamp pattern for log lines.
const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ── Levels ──────────────────────────────────────────────────────────────

/// Severity of a log record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" | "WARN" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            "CRITICAL" | "FATAL" => Some(LogLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Equivalent `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Sinks ───────────────────────────────────────────────────────────────

/// Kind of a [`LogSink`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    File,
    Console,
}

/// Destination for formatted log lines.
pub trait LogSink: Send {
    fn kind(&self) -> SinkKind;

    /// Write one line; the sink appends the newline.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Backing file, for file sinks.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Appends lines to a file. Writes are unbuffered so the file size seen by
/// the rotation check is always current.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open `path` for appending, creating it if absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io_at(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl LogSink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.file.write_all(buf.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Mirrors lines to stderr.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", line)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

// ── Logger ──────────────────────────────────────────────────────────────

struct LoggerState {
    name: String,
    level: LogLevel,
    sinks: Vec<Box<dyn LogSink>>,
    write_failures: u64,
}

impl LoggerState {
    /// Write to every sink; returns the number of sinks that failed.
    fn emit(&mut self, line: &str) -> usize {
        let mut failed = 0;
        for sink in &mut self.sinks {
            if sink.write_line(line).is_err() {
                failed += 1;
            }
        }
        self.write_failures += failed as u64;
        failed
    }
}

/// Shared handle to one application's log sinks.
#[derive(Clone)]
pub struct AppLogger {
    inner: Arc<Mutex<LoggerState>>,
}

impl AppLogger {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoggerState {
                name: name.into(),
                level,
                sinks: Vec::new(),
                write_failures: 0,
            })),
        }
    }

    /// Rename and re-level the logger in place; clones see the change.
    pub fn configure(&self, name: impl Into<String>, level: LogLevel) {
        let mut state = self.inner.lock();
        state.name = name.into();
        state.level = level;
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn level(&self) -> LogLevel {
        self.inner.lock().level
    }

    pub fn set_level(&self, level: LogLevel) {
        self.inner.lock().level = level;
    }

    pub fn attach(&self, sink: Box<dyn LogSink>) {
        self.inner.lock().sinks.push(sink);
    }

    /// Open `path` and attach it as a file sink.
    pub fn attach_file(&self, path: &Path) -> Result<()> {
        let sink = FileSink::open(path)?;
        self.attach(Box::new(sink));
        Ok(())
    }

    /// Flush, close, and drop every sink. Returns how many were removed.
    pub fn detach_all(&self) -> usize {
        let sinks = self.take_sinks();
        self.release(sinks)
    }

    /// Remove every sink without closing it, so the caller can put the list
    /// back with [`AppLogger::restore_sinks`] or close it with
    /// [`AppLogger::release`].
    pub fn take_sinks(&self) -> Vec<Box<dyn LogSink>> {
        std::mem::take(&mut self.inner.lock().sinks)
    }

    /// Replace the current sinks with `sinks`; the replaced ones are closed.
    pub fn restore_sinks(&self, sinks: Vec<Box<dyn LogSink>>) {
        let replaced = std::mem::replace(&mut self.inner.lock().sinks, sinks);
        self.release(replaced);
    }

    /// Flush and drop sinks that are no longer attached. Flush failures count
    /// toward [`AppLogger::write_failures`]. Returns how many were dropped.
    pub fn release(&self, sinks: Vec<Box<dyn LogSink>>) -> usize {
        let count = sinks.len();
        let failed = flush_all(sinks);
        if failed > 0 {
            self.inner.lock().write_failures += failed;
        }
        count
    }

    /// Flush, close, and drop file sinks only; returns their paths.
    pub fn detach_files(&self) -> Vec<PathBuf> {
        let files = {
            let mut state = self.inner.lock();
            let (files, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.sinks)
                .into_iter()
                .partition(|s| s.kind() == SinkKind::File);
            state.sinks = rest;
            files
        };

        let paths = files
            .iter()
            .filter_map(|s| s.path().map(Path::to_path_buf))
            .collect();
        self.release(files);
        paths
    }

    pub fn sink_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .sinks
            .iter()
            .filter_map(|s| s.path().map(Path::to_path_buf))
            .collect()
    }

    /// Total failed sink writes since creation.
    pub fn write_failures(&self) -> u64 {
        self.inner.lock().write_failures
    }

    /// Format and write a record if `level` passes the logger's threshold.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let failed = {
            let mut state = self.inner.lock();
            if level < state.level || state.sinks.is_empty() {
                return;
            }
            let line = format!(
                "{} [{}] {}: {}",
                Local::now().format(LINE_TIMESTAMP_FORMAT),
                level,
                state.name,
                message.as_ref()
            );
            state.emit(&line)
        };

        // Reported outside the lock: a tracing subscriber may write back
        // into this logger.
        if failed > 0 {
            tracing::warn!(failed, "log sink write failed");
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Critical, message);
    }

    /// Write an already formatted line to every sink, bypassing the level.
    pub fn write_raw(&self, line: &str) {
        self.inner.lock().emit(line);
    }

    pub fn flush(&self) {
        let mut state = self.inner.lock();
        let failed = state
            .sinks
            .iter_mut()
            .map(|sink| sink.flush().is_err())
            .filter(|failed| *failed)
            .count();
        state.write_failures += failed as u64;
    }
}

impl fmt::Debug for AppLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("AppLogger")
            .field("name", &state.name)
            .field("level", &state.level)
            .field("sinks", &state.sinks.len())
            .finish()
    }
}

/// Flush and drop `sinks`; returns the number of failed flushes.
fn flush_all(sinks: Vec<Box<dyn LogSink>>) -> u64 {
    sinks
        .into_iter()
        .map(|mut sink| u64::from(sink.flush().is_err()))
        .sum()
}

// ── tracing integration ─────────────────────────────────────────────────

/// Buffers one formatted `tracing` event and hands it to the logger.
pub struct LogWriter {
    logger: AppLogger,
    buf: Vec<u8>,
}

impl LogWriter {
    fn emit(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines() {
            self.logger.write_raw(line);
        }
        self.buf.clear();
    }
}

impl Write for LogWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.emit();
    }
}

impl<'a> MakeWriter<'a> for AppLogger {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            logger: self.clone(),
            buf: Vec::new(),
        }
    }
}

/// Install a global `tracing` subscriber that writes into `logger`.
///
/// `RUST_LOG` overrides the logger's level when set.
pub fn init_tracing(logger: &AppLogger) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logger.level().as_filter()));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(logger.clone())
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Captures lines in memory.
    struct MemorySink(Arc<Mutex<Vec<String>>>);

    impl LogSink for MemorySink {
        fn kind(&self) -> SinkKind {
            SinkKind::Console
        }

        fn write_line(&mut self, line: &str) -> io::Result<()> {
            self.0.lock().push(line.to_string());
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse(" Warning "), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("critical"), Some(LogLevel::Critical));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!(LogLevel::Debug < LogLevel::Error);
    }

    #[test]
    fn records_below_level_are_dropped() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = AppLogger::new("app", LogLevel::Warning);
        logger.attach(Box::new(MemorySink(lines.clone())));

        logger.info("quiet");
        logger.error("loud");

        let lines = lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[ERROR] app: loud"));
    }

    #[test]
    fn file_sink_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        let logger = AppLogger::new("app", LogLevel::Debug);
        logger.attach_file(&path).unwrap();

        logger.info("first");
        logger.debug("second");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("[INFO] app: first"));
        assert_eq!(logger.file_paths(), vec![path]);
    }

    #[test]
    fn detach_files_keeps_console() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        let logger = AppLogger::new("app", LogLevel::Info);
        logger.attach_file(&path).unwrap();
        logger.attach(Box::new(ConsoleSink));

        assert_eq!(logger.detach_files(), vec![path]);
        assert_eq!(logger.sink_count(), 1);
        assert_eq!(logger.detach_all(), 1);
        assert_eq!(logger.sink_count(), 0);
    }

    /// Accepts writes, fails every flush.
    struct StuckSink;

    impl LogSink for StuckSink {
        fn kind(&self) -> SinkKind {
            SinkKind::Console
        }

        fn write_line(&mut self, _line: &str) -> io::Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "stuck"))
        }
    }

    #[test]
    fn flush_failures_are_counted() {
        let logger = AppLogger::new("app", LogLevel::Info);
        logger.attach(Box::new(StuckSink));
        logger.attach(Box::new(ConsoleSink));

        logger.flush();
        assert_eq!(logger.write_failures(), 1);

        assert_eq!(logger.detach_all(), 2);
        assert_eq!(logger.write_failures(), 2);
    }

    #[test]
    fn restore_sinks_puts_back_taken_list() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = AppLogger::new("app", LogLevel::Info);
        logger.attach(Box::new(MemorySink(lines.clone())));

        let taken = logger.take_sinks();
        assert_eq!(logger.sink_count(), 0);
        logger.attach(Box::new(StuckSink));

        logger.restore_sinks(taken);
        assert_eq!(logger.sink_count(), 1);
        assert_eq!(logger.write_failures(), 1);

        logger.info("back");
        assert_eq!(lines.lock().len(), 1);
    }

    #[test]
    fn clones_share_sinks() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = AppLogger::new("app", LogLevel::Info);
        let clone = logger.clone();
        logger.attach(Box::new(MemorySink(lines.clone())));
        clone.configure("renamed", LogLevel::Info);

        clone.info("hello");
        assert!(lines.lock()[0].contains("renamed: hello"));
    }

    #[test]
    fn make_writer_forwards_whole_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = AppLogger::new("app", LogLevel::Info);
        logger.attach(Box::new(MemorySink(lines.clone())));

        {
            let mut writer = logger.make_writer();
            writer.write_all(b"2025-01-01 INFO event one\n").unwrap();
        }

        assert_eq!(lines.lock().as_slice(), ["2025-01-01 INFO event one"]);
    }
}
