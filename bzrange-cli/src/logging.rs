//! Diagnostic logging setup
//!
//! Everything goes to stderr; stdout carries only extracted log data.

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives; `RUST_LOG` is the fallback
pub const LOG_ENV: &str = "BZRANGE_LOG";

/// Diagnostic output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human readable
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

/// Install the global subscriber. `directives` applies when neither
/// environment variable is set.
pub fn setup_logging(directives: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(directives));

    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
        LogFormat::Compact => registry.with(layer.compact()).init(),
        LogFormat::Json => registry
            .with(layer.json().flatten_event(true).with_current_span(false))
            .init(),
    }
}
