//! Shared fixtures for the integration suites: a client wired to a mock
//! orchestrator and builders for its response bodies.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crossdag::infrastructure::airflow::{AirflowClient, ClientConfig, RetryPolicy};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const BATCH: &str = "integration_test";
pub const SESSION: &str = "b9c867dc-5319-4ad4-97e0-6474260b10de";

/// Client pointed at the mock server, with a fast retry policy so
/// exhaustion-path tests stay quick.
pub fn client(server: &MockServer) -> Arc<AirflowClient> {
    Arc::new(
        AirflowClient::new(ClientConfig {
            api_url: server.uri(),
            session_cookie: SESSION.to_string(),
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            timeout_secs: 5,
        })
        .unwrap(),
    )
}

/// One DAG run as the orchestrator lists it.
pub fn dag_run(dag_id: &str, run_id: &str, state: &str, conf: Value) -> Value {
    json!({
        "dag_id": dag_id,
        "dag_run_id": run_id,
        "state": state,
        "conf": conf,
    })
}

pub fn dag_runs_body(runs: Vec<Value>) -> Value {
    json!({ "dag_runs": runs })
}

pub fn task_instance_body(task_id: &str, state: &str) -> Value {
    json!({
        "task_id": task_id,
        "state": state,
        "try_number": 1,
    })
}

pub fn xcom_body(value: &Value) -> Value {
    json!({
        "key": "return_value",
        "value": serde_json::to_string(value).unwrap(),
    })
}

pub fn dag_info_body(dag_id: &str, is_paused: bool) -> Value {
    json!({
        "dag_id": dag_id,
        "is_paused": is_paused,
    })
}
