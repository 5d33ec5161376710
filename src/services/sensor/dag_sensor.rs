//! Sensor over upstream DAG-run state.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::table::Table;
use crate::infrastructure::airflow::AirflowClient;

use super::UpstreamSensor;

/// Considers an upstream ready when its DAG run reaches the desired
/// state.
pub struct DagSensor {
    client: Arc<AirflowClient>,
    batch_id: String,
    dag_id: String,
}

impl DagSensor {
    pub fn new(client: Arc<AirflowClient>, batch_id: String, dag_id: String) -> Self {
        Self {
            client,
            batch_id,
            dag_id,
        }
    }
}

#[async_trait]
impl UpstreamSensor for DagSensor {
    async fn sense(&self, desired_state: Option<&str>) -> DomainResult<Table> {
        let runs = self
            .client
            .list_dag_runs(&self.batch_id, &self.dag_id)
            .await?;
        if runs.is_empty() {
            return Ok(runs);
        }
        let runs = match desired_state {
            Some(state) => runs.filtered_eq("dag_run_state", &Value::String(state.to_string())),
            None => runs,
        };
        Ok(runs.with_column("state", |row| {
            row.get("dag_run_state").cloned().unwrap_or(Value::Null)
        }))
    }

    fn query_key_values(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            (
                "batch_id".to_string(),
                Value::String(self.batch_id.clone()),
            ),
            ("dag_id".to_string(), Value::String(self.dag_id.clone())),
        ])
    }
}
