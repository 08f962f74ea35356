//! Logging infrastructure for obs
//!
//! The agent reports its own problems (invalid DSN, failed deliveries) as
//! `tracing` events under the `obs_core` target. Applications that already
//! install a subscriber get them for free; [`init`] is for those that don't,
//! and routes them to stderr or to a daily-rotated file.

use crate::config::LoggingConfig;
use tracing::subscriber::NoSubscriber;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// File name prefix for rotated log files
pub const LOG_FILE_NAME: &str = "obs.log";

/// Initialize the logging system
///
/// Sets up tracing with:
/// - stderr output, or file output with daily rotation when
///   `config.directory` is set
/// - Configurable log level via config or RUST_LOG env var
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    // Non-blocking writer so a slow stderr never stalls the dispatch worker
    let (non_blocking, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
            tracing_appender::non_blocking(file_appender)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // Build the filter from config or env var
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| crate::error::Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::debug!(
        level = %config.level,
        directory = ?config.directory,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Emit the agent's own diagnostics raised inside `f`.
///
/// When neither the application nor [`init`] installed a subscriber, the
/// events go to stderr (warnings and errors only) instead of vanishing.
pub(crate) fn diagnose<T>(f: impl FnOnce() -> T) -> T {
    diagnose_to(std::io::stderr, f)
}

fn diagnose_to<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if has_subscriber() {
        return f();
    }

    let fallback = fmt::Subscriber::builder()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::with_default(fallback, f)
}

fn has_subscriber() -> bool {
    tracing::dispatcher::get_default(|dispatch| !dispatch.is::<NoSubscriber>())
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}
