//! Logging initialization.
//!
//! Every binary calls [`init_logging`] once at startup and uses plain
//! `tracing` macros everywhere else. Output goes to stderr in a compact
//! human format; when `SESSION_LOG_FILE` is set, structured JSONL is also
//! appended to that file.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable naming an optional JSONL log file.
pub const LOG_FILE_ENV: &str = "SESSION_LOG_FILE";

/// Append-only file writer shared by every log line.
#[derive(Clone)]
pub struct LogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogWriter {
    /// Open (or create) `path` in append mode, creating parent directories.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        // One flush per line keeps concurrent tails readable.
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Normalized directive for `level`; unknown names fall back to `info`.
fn level_directive(level: &str) -> String {
    parse_level(level.trim()).as_str().to_lowercase()
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_directive(level)))
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is
/// harmless: later calls leave the first subscriber in place.
pub fn init_logging(level: &str) {
    let file_path: Option<PathBuf> = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);

    let file_layer = match file_path.as_deref().map(LogWriter::new) {
        Some(Ok(writer)) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(writer)
                .with_filter(env_filter(level)),
        ),
        Some(Err(e)) => {
            eprintln!("failed to open log file {:?}: {}", file_path, e);
            None
        }
        None => None,
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(io::stderr)
        .with_filter(env_filter(level));

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            level = %level,
            log_file = ?file_path,
            "logging initialized"
        );
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::tempdir;

    #[test]
    fn test_parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn test_parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
        assert_eq!(parse_level("DEBUG"), tracing::Level::DEBUG);
    }

    #[test]
    fn test_level_directive_normalizes_names() {
        assert_eq!(level_directive("warning"), "warn");
        assert_eq!(level_directive(" DEBUG "), "debug");
        assert_eq!(level_directive("verbose"), "info");
    }

    #[test]
    fn test_log_writer_appends_and_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("session.jsonl");

        let mut writer = LogWriter::new(&path).unwrap();
        writer.write_all(b"first\n").unwrap();
        let mut again = LogWriter::new(&path).unwrap();
        again.write_all(b"second\n").unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging("debug");
        init_logging("info");
        tracing::info!("still alive");
    }
}
