//! Typed client for the orchestrator's REST API.
//!
//! Thin wrapper over GET/POST with a transport-level retry policy. The
//! wire contract (paths, bodies, the `session` cookie) is fixed by the
//! external orchestrator and treated as bit-exact here.

pub mod client;
pub mod error;
pub mod retry;

pub use client::{AirflowClient, ClientConfig, DagInfo, TriggerOutcome};
pub use error::ApiError;
pub use retry::RetryPolicy;
