//! # Observability
//!
//! Installs the global `tracing` subscriber for applications embedding
//! `rag-gateway`. Generation calls, retries and retrieval runs emit spans and
//! events under the `rag_gateway` target; `log` records from the extraction
//! helpers are bridged into the same subscriber.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level captured for this crate.
    pub level: Level,
    /// Where formatted records are written.
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
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
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file.
    File(String),
}

/// Builds the filter directive applied on top of `RUST_LOG`.
pub fn filter_directive(level: Level) -> String {
    format!("rag_gateway={}", level)
}

/// Initializes the global tracing subscriber.
///
/// Call once at the start of `main`. Returns an error if a global subscriber
/// or `log` bridge is already installed.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive(filter_directive(config.level).parse()?);

    tracing_log::LogTracer::init()?;

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.target {
        LogTarget::Console => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            tracing::subscriber::set_global_default(subscriber.with(layer))?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(file);
            tracing::subscriber::set_global_default(subscriber.with(layer))?;
        }
    };

    Ok(())
}
