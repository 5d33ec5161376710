//! Logging initialization using tracing.

use std::io;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use super::config::{LogConfig, LogFormat};

/// Initialize the global subscriber from config.
///
/// Stdout gets the configured format; when `log_dir` is set, JSON logs
/// are additionally written to a daily-rotated file. The returned guard
/// must stay alive for the lifetime of the process to flush the file
/// writer.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(
                config
                    .level
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::INFO.into()),
            )
            .from_env_lossy()
    };

    if let Some(log_dir) = &config.log_dir {
        let file_appender = rolling::daily(log_dir, "crossdag.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(filter());

        match config.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(file_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stdout)
                        .with_filter(filter()),
                )
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(file_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stdout)
                        .with_filter(filter()),
                )
                .try_init(),
        }
        .context("Failed to initialize logging")?;
        Ok(Some(guard))
    } else {
        match config.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stdout)
                        .with_filter(filter()),
                )
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stdout)
                        .with_filter(filter()),
                )
                .try_init(),
        }
        .context("Failed to initialize logging")?;
        Ok(None)
    }
}
