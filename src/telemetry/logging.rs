//! Subscriber setup for processes using the facade.
//!
//! Two layers share one registry. The diagnostic layer prints the crate's
//! own `clusterlog` events to stderr (or a file) in JSON or pretty form.
//! The [`ForwardingLayer`] sends every other event through the
//! [`LogContext`], so the sink sees application `tracing` output too.

use std::path::PathBuf;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::filter_fn, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use super::layer::{is_internal, ForwardingLayer};
use crate::context::LogContext;

/// Diagnostic output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Format of the diagnostic stream.
    pub format: LogFormat,
    /// Filter for the diagnostic stream (e.g. "warn", "clusterlog=debug").
    pub level: String,
    /// Optional file for diagnostics. If None, they go to stderr.
    pub output_path: Option<PathBuf>,
    /// Most verbose application level passed to the log context.
    pub forward_level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "warn".to_string(),
            output_path: None,
            forward_level: LevelFilter::TRACE,
        }
    }
}

impl LogConfig {
    /// Defaults with the diagnostic filter taken from `RUST_LOG` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("RUST_LOG") {
            if !level.trim().is_empty() {
                config.level = level;
            }
        }
        config
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig, ctx: &LogContext) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
    let diag: BoxedLayer = match (&config.output_path, config.format) {
        (Some(path), format) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LogError::FileOpen(format!("{}: {e}", path.display())))?;
            let writer = std::sync::Mutex::new(file);
            match format {
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
                LogFormat::Pretty => fmt::layer()
                    .pretty()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            }
        }
        (None, LogFormat::Json) => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        (None, LogFormat::Pretty) => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    };
    let diag = diag
        .with_filter(filter)
        .with_filter(filter_fn(|meta| is_internal(meta.target())));

    let forwarding = ForwardingLayer::new(ctx.clone()).with_filter(config.forward_level);

    tracing_subscriber::registry()
        .with(diag)
        .with(forwarding)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}
