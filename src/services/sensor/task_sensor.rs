//! Sensor over the state of one task inside upstream DAG runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::table::Table;
use crate::infrastructure::airflow::AirflowClient;

use super::UpstreamSensor;

/// Considers an upstream ready when a specific task instance reaches the
/// desired state, regardless of the overall DAG-run state.
pub struct TaskSensor {
    client: Arc<AirflowClient>,
    batch_id: String,
    dag_id: String,
    task_id: String,
    /// When set, runs whose task instance does not exist (404) are
    /// dropped from the row-set instead of failing the tick.
    tolerate_missing: bool,
}

impl TaskSensor {
    pub fn new(
        client: Arc<AirflowClient>,
        batch_id: String,
        dag_id: String,
        task_id: String,
        tolerate_missing: bool,
    ) -> Self {
        Self {
            client,
            batch_id,
            dag_id,
            task_id,
            tolerate_missing,
        }
    }
}

#[async_trait]
impl UpstreamSensor for TaskSensor {
    async fn sense(&self, desired_state: Option<&str>) -> DomainResult<Table> {
        let runs = self
            .client
            .list_dag_runs(&self.batch_id, &self.dag_id)
            .await?;
        if runs.is_empty() {
            return Ok(runs);
        }

        let fetches = runs
            .rows()
            .iter()
            .filter_map(|row| row.get("dag_run_id").and_then(Value::as_str))
            .map(|run_id| {
                self.client
                    .get_task_instance(&self.dag_id, run_id, &self.task_id)
            });
        let mut instances = Table::new();
        for fetched in join_all(fetches).await {
            match fetched {
                Ok(row) => instances.push(row),
                Err(err) if err.is_not_found() && self.tolerate_missing => {}
                Err(err) => return Err(err.into()),
            }
        }

        let on = ["dag_id", "dag_run_id"].map(String::from);
        let joined = runs.inner_join(&instances, &on);
        let joined = match desired_state {
            Some(state) => {
                joined.filtered_eq("task_instance_state", &Value::String(state.to_string()))
            }
            None => joined,
        };
        Ok(joined.with_column("state", |row| {
            row.get("task_instance_state")
                .cloned()
                .unwrap_or(Value::Null)
        }))
    }

    fn query_key_values(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            (
                "batch_id".to_string(),
                Value::String(self.batch_id.clone()),
            ),
            ("dag_id".to_string(), Value::String(self.dag_id.clone())),
            ("task_id".to_string(), Value::String(self.task_id.clone())),
        ])
    }
}
