//! Infrastructure edges: the orchestrator REST client, cookie-session
//! reading, configuration loading, and logging initialization.

pub mod airflow;
pub mod config;
pub mod cookie;
pub mod logging;
