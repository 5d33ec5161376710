//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// Derived-workflow scheduler: watches upstream DAGs through the
/// orchestrator REST API and triggers downstream DAG runs per ready
/// scene.
#[derive(Parser, Debug)]
#[command(name = "crossdag", version, about)]
pub struct Cli {
    /// Path to the YAML batch config. Its file stem is used as the
    /// batch id.
    #[arg(long)]
    pub batch_config: PathBuf,

    /// Path to the file holding the orchestrator `session` cookie value.
    #[arg(long)]
    pub cookie_session_path: PathBuf,

    /// Base URL of the orchestrator REST API.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub api_url: String,
}
