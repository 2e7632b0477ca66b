//! Structured logging.
//!
//! # Design Decisions
//! - JSON lines for production, plain text for local runs
//! - Writes go through a non-blocking stdout writer; keep the returned
//!   guard alive until exit so buffered lines are flushed

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LogLevel};
use crate::observability::ObservabilityError;

/// Flushes buffered log lines when dropped.
#[must_use = "dropping the guard stops the log writer"]
#[derive(Debug)]
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global log sink.
///
/// If a subscriber is already installed (as in tests running in one
/// process) the existing one is kept.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<LogGuard, ObservabilityError> {
    let filter = EnvFilter::try_new(level.as_filter())
        .map_err(|e| ObservabilityError::Logging(e.to_string()))?;
    let (writer, worker) = tracing_appender::non_blocking(std::io::stdout());

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .with_ansi(false)
            .boxed(),
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Log subscriber already installed, keeping it");
    }

    Ok(LogGuard { _worker: worker })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinitialising_is_not_an_error() {
        let first = init_logging(LogLevel::Debug, LogFormat::Text).unwrap();
        let second = init_logging(LogLevel::Info, LogFormat::Json).unwrap();
        tracing::info!("logged after double init");
        drop(second);
        drop(first);
    }
}
