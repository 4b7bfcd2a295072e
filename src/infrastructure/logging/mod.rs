//! Tracing subscriber setup.
//!
//! Stdout output in `pretty` or `json` format with an env-filter; when a log
//! directory is configured, a daily-rotated file layer is added alongside.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::domain::models::config::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// Returns the appender guard which must be held for the process lifetime
/// when file logging is enabled.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    type BaseSubscriber = tracing_subscriber::layer::Layered<EnvFilter, Registry>;

    let mut guard = None;
    let file_layer: Option<Box<dyn Layer<BaseSubscriber> + Send + Sync>> =
        config.dir.as_ref().map(|dir| {
            let appender = tracing_appender::rolling::daily(dir, "veplane.log");
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            Box::new(fmt::layer().json().with_writer(writer))
                as Box<dyn Layer<BaseSubscriber> + Send + Sync>
        });

    if config.format == "json" {
        let stdout_layer =
            Box::new(fmt::layer().json()) as Box<dyn Layer<BaseSubscriber> + Send + Sync>;
        registry.with(stdout_layer.and_then(file_layer)).init();
    } else {
        let stdout_layer =
            Box::new(fmt::layer()) as Box<dyn Layer<BaseSubscriber> + Send + Sync>;
        registry.with(stdout_layer.and_then(file_layer)).init();
    }

    Ok(guard)
}
