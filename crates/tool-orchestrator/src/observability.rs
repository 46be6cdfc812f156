//! # Observability
//!
//! Installs a `tracing` subscriber for applications embedding the
//! orchestrator. The library itself only emits spans and events; nothing is
//! printed unless the host calls [`init`] or installs its own subscriber.
//!
//! Spans emitted by the orchestrator:
//!
//! - `orchestrator_execute` (`total_calls`, `fail_fast`, `parallel`)
//! - `graph_level` (`level`, `calls`)
//! - `tool_call` (`call_id`, `operation`, `level`)

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level to capture for this crate.
    pub level: Level,
    /// The target for the logs.
    pub target: LogTarget,
    pub format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
            format: LogFormat::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file, truncating it first.
    File(PathBuf),
}

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per event, including the span stack.
    Json,
}

/// Initializes the global tracing subscriber.
///
/// Call once at the beginning of the application's `main`. `RUST_LOG`
/// directives are honored in addition to the configured level.
///
/// Returns an error if a global subscriber is already installed or if the
/// log file cannot be created.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("tool_orchestrator={}", config.level).parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    match (config.target, config.format) {
        (LogTarget::Console, LogFormat::Pretty) => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        (LogTarget::Console, LogFormat::Json) => {
            let layer = fmt::layer().json().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        (LogTarget::File(path), format) => {
            let file = Mutex::new(std::fs::File::create(path)?);
            match format {
                LogFormat::Pretty => {
                    let layer = fmt::layer().with_ansi(false).with_writer(file);
                    subscriber.with(layer).try_init()?;
                }
                LogFormat::Json => {
                    let layer = fmt::layer().json().with_writer(file);
                    subscriber.with(layer).try_init()?;
                }
            }
        }
    };

    Ok(())
}
