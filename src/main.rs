//! Crossdag CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossdag::{
    cli::Cli,
    infrastructure::{
        airflow::{AirflowClient, ClientConfig},
        config::ConfigLoader,
        cookie, logging,
    },
    services::registry,
};
use tokio::task::JoinSet;
use tracing::info;

// The watcher fleet is cooperatively scheduled: every tick suspends on
// network I/O, so one thread carries all watchers.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_from_file(&cli.batch_config)
        .context("Failed to load batch configuration")?;
    let _guard = logging::init(&config.logging).context("Failed to initialize logging")?;

    let batch_id = cli
        .batch_config
        .file_stem()
        .and_then(|stem| stem.to_str())
        .context("batch-config path has no file stem to use as batch id")?
        .to_string();

    let session_cookie = cookie::read_cookie_session(&cli.cookie_session_path)
        .context("Failed to read cookie session")?;
    let client = Arc::new(AirflowClient::new(ClientConfig {
        api_url: cli.api_url.clone(),
        session_cookie,
        ..ClientConfig::default()
    })?);

    info!(batch_id, api_url = %cli.api_url, watchers = config.watchers.len(), "starting watcher fleet");

    let mut fleet = JoinSet::new();
    for watcher_config in config.watchers {
        let watcher = registry::build_watcher(&client, &batch_id, watcher_config)?;
        info!(dag_id = %watcher.dag_id(), "constructed watcher");
        fleet.spawn(async move { watcher.run().await });
    }

    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received, stopping watcher fleet");
        }
        _ = async { while fleet.join_next().await.is_some() {} } => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
