//! Centralized observability layer shared by the daemon and client
//! binaries (§2's ambient logging layer).
//!
//! Both binaries call [`init`] or [`init_with_config`] exactly once at
//! startup and then use ordinary `tracing` macros. Every log line lands
//! in the same append-only JSONL file regardless of which process wrote
//! it, since the daemon and its clients are separate OS processes
//! sharing one host (`RCMD_LOG_PATH`, §6).
//!
//! Unlike the daemon, the client driver also writes user-facing text
//! straight to stdout/stderr; those are ordinary prints, never log
//! lines, and the two channels are never mixed.

mod json_layer;

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use json_layer::JsonLayer;

/// Configuration for [`init_with_config`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the binary emitting logs (e.g. "daemon", "client").
    pub service_name: String,
    /// Default `tracing` filter, overridable by `RUST_LOG`.
    pub default_level: String,
    /// Central log file path. Defaults to `~/.rcmd/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,
    /// Also emit a compact line to stderr — used by `start --foreground`
    /// and by the client driver for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "rcmd".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Append-only, per-line-flushed writer onto the central log file, safe
/// for multiple processes to share: each write is a single `write` +
/// `flush` pair, which is atomic at the filesystem level for
/// reasonable-length lines.
#[derive(Clone)]
struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<std::fs::File>>>,
}

impl CentralLogWriter {
    fn new(path: &PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

#[derive(Clone)]
struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn default_log_path() -> PathBuf {
    if let Ok(custom) = std::env::var("RCMD_LOG_PATH") {
        return PathBuf::from(custom);
    }
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".rcmd")
        .join("logs")
        .join("dev.jsonl")
}

/// Zero-config entry point: `rcmd_observability::init("daemon")`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Install the global `tracing` subscriber. Panics if the log file
/// cannot be created — logging failure at startup is unrecoverable for
/// either binary, matching the reference codebase's own `init` contract.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let writer = CentralLogWriter::new(&log_path)
        .unwrap_or_else(|e| panic!("failed to open log file {log_path:?}: {e}"));
    let writer_factory = WriterFactory { writer };
    let json_layer = JsonLayer::new(config.service_name.clone(), writer_factory);

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
    } else {
        None
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter))
        .with(stderr_layer.map(|l| {
            l.with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        }))
        .init();

    tracing::info!(log_path = %log_path.display(), service = %config.service_name, "observability initialized");
}
