//! Orchestrator REST client.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::COOKIE;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::table::{Row, Table};

use super::error::ApiError;
use super::retry::RetryPolicy;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the orchestrator REST API.
    pub api_url: String,
    /// Value of the `session` cookie attached to every request.
    pub session_cookie: String,
    /// Transport-level retry policy.
    pub retry: RetryPolicy,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            session_cookie: String::new(),
            retry: RetryPolicy::default(),
            timeout_secs: 30,
        }
    }
}

/// Basic DAG metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct DagInfo {
    pub is_paused: bool,
}

/// Outcome of a trigger request.
///
/// A paused target DAG is not an error: no run is submitted and the
/// caller logs and moves on.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Triggered(Value),
    Paused,
}

/// Typed operations against the orchestrator REST API.
///
/// One shared reqwest client (connection pooling), the `session` cookie on
/// every request, and the retry policy wrapped around each call.
pub struct AirflowClient {
    http: ReqwestClient,
    api_url: String,
    cookie_header: String,
    retry: RetryPolicy,
}

impl AirflowClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            cookie_header: format!("session={}", config.session_cookie),
            retry: config.retry,
        })
    }

    /// All DAG runs of `dag_id` whose trigger payload carries the batch
    /// tag, as a row-set.
    ///
    /// The trigger payload is flattened into top-level columns next to
    /// `dag_id`, `dag_run_id` and `dag_run_state` (aliased from the
    /// orchestrator's `state`); payload keys never overwrite those three.
    /// An empty listing is a legal empty row-set.
    pub async fn list_dag_runs(&self, batch_id: &str, dag_id: &str) -> Result<Table, ApiError> {
        let url = format!("{}/api/v1/dags/{dag_id}/dagRuns", self.api_url);
        let body = self.get(&url).await?;
        let runs = body
            .get("dag_runs")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ApiError::Transport(format!("malformed response from {url}: missing `dag_runs`"))
            })?;

        let mut table = Table::new();
        for run in runs {
            let conf = run.get("conf").and_then(Value::as_object);
            let run_batch = conf.and_then(|c| c.get("batch_id")).and_then(Value::as_str);
            if run_batch != Some(batch_id) {
                continue;
            }
            let mut row = Row::new();
            row.insert(
                "dag_id".to_string(),
                run.get("dag_id")
                    .cloned()
                    .unwrap_or_else(|| Value::String(dag_id.to_string())),
            );
            row.insert(
                "dag_run_id".to_string(),
                run.get("dag_run_id").cloned().unwrap_or(Value::Null),
            );
            row.insert(
                "dag_run_state".to_string(),
                run.get("state").cloned().unwrap_or(Value::Null),
            );
            if let Some(conf) = conf {
                for (key, value) in conf {
                    row.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            table.push(row);
        }
        debug!(dag_id, batch_id, runs = table.len(), "listed dag runs");
        Ok(table)
    }

    /// One task instance of a DAG run, trimmed to the columns the sensing
    /// algebra joins on. 404 means the task or run is absent.
    pub async fn get_task_instance(
        &self,
        dag_id: &str,
        dag_run_id: &str,
        task_id: &str,
    ) -> Result<Row, ApiError> {
        let url = format!(
            "{}/api/v1/dags/{dag_id}/dagRuns/{dag_run_id}/taskInstances/{task_id}",
            self.api_url
        );
        let body = self.get(&url).await?;

        let mut row = Row::new();
        row.insert("dag_id".to_string(), Value::String(dag_id.to_string()));
        row.insert(
            "dag_run_id".to_string(),
            Value::String(dag_run_id.to_string()),
        );
        row.insert(
            "task_id".to_string(),
            body.get("task_id")
                .cloned()
                .unwrap_or_else(|| Value::String(task_id.to_string())),
        );
        row.insert(
            "task_instance_state".to_string(),
            body.get("state").cloned().unwrap_or(Value::Null),
        );
        Ok(row)
    }

    /// Raw xcom value pushed by `task_id` under `xcom_key`.
    pub async fn get_xcom(
        &self,
        dag_id: &str,
        dag_run_id: &str,
        task_id: &str,
        xcom_key: &str,
    ) -> Result<String, ApiError> {
        let url = format!(
            "{}/api/v1/dags/{dag_id}/dagRuns/{dag_run_id}/taskInstances/{task_id}/xcomEntries/{xcom_key}",
            self.api_url
        );
        let body = self.get(&url).await?;
        body.get("value")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                ApiError::Transport(format!("malformed response from {url}: missing `value`"))
            })
    }

    pub async fn get_dag_info(&self, dag_id: &str) -> Result<DagInfo, ApiError> {
        let url = format!("{}/api/v1/dags/{dag_id}", self.api_url);
        let body = self.get(&url).await?;
        serde_json::from_value(body)
            .map_err(|err| ApiError::Transport(format!("malformed response from {url}: {err}")))
    }

    /// Trigger a DAG run with the given payload.
    ///
    /// If the target DAG is paused nothing is submitted and
    /// [`TriggerOutcome::Paused`] is returned. `dag_run_id`, when given,
    /// is the client-chosen run identifier the orchestrator deduplicates
    /// on.
    pub async fn trigger_dag(
        &self,
        dag_id: &str,
        conf: Map<String, Value>,
        dag_run_id: Option<String>,
    ) -> Result<TriggerOutcome, ApiError> {
        let info = self.get_dag_info(dag_id).await?;
        if info.is_paused {
            return Ok(TriggerOutcome::Paused);
        }

        let url = format!("{}/api/v1/dags/{dag_id}/dagRuns", self.api_url);
        let mut payload = json!({ "conf": conf });
        if let Some(run_id) = dag_run_id {
            payload["dag_run_id"] = Value::String(run_id);
        }
        let body = self.post(&url, &payload).await?;
        Ok(TriggerOutcome::Triggered(body))
    }

    async fn get(&self, url: &str) -> Result<Value, ApiError> {
        self.retry.execute(|| self.get_once(url)).await
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Value, ApiError> {
        self.retry.execute(|| self.post_once(url, payload)).await
    }

    async fn get_once(&self, url: &str) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(url)
            .header(COOKIE, &self.cookie_header)
            .send()
            .await?;
        Self::decode(url, response).await
    }

    async fn post_once(&self, url: &str, payload: &Value) -> Result<Value, ApiError> {
        let response = self
            .http
            .post(url)
            .header(COOKIE, &self.cookie_header)
            .json(payload)
            .send()
            .await?;
        Self::decode(url, response).await
    }

    async fn decode(url: &str, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::from_status(status, url, body));
        }
        Ok(response.json().await?)
    }
}
