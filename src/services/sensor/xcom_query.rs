//! Inter-task key/value lookups driving expansion and reduction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{DomainResult, WatchError};
use crate::domain::table::Table;
use crate::infrastructure::airflow::AirflowClient;

fn default_xcom_key() -> String {
    "return_value".to_string()
}

/// Description of an inter-task key/value lookup.
///
/// `query` turns the xcom pushed by `task_id` of every successful
/// `dag_id` run into a per-scene list of sub-keys named `refer_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XComQuery {
    pub dag_id: String,
    pub task_id: String,
    #[serde(default = "default_xcom_key")]
    pub xcom_key: String,
    /// Column name the sub-keys appear under.
    pub refer_name: String,
}

impl XComQuery {
    /// Fetch and explode the sub-key lists.
    ///
    /// Returns columns `base_scene_id_keys + [refer_name]`, one row per
    /// sub-key. An absent upstream DAG, a batch with no success runs, or
    /// a missing xcom for every run all yield an empty row-set; a watcher
    /// never fails because its expansion source has not produced yet.
    pub async fn query(
        &self,
        client: &AirflowClient,
        batch_id: &str,
        base_scene_id_keys: &[String],
    ) -> DomainResult<Table> {
        let runs = match client.list_dag_runs(batch_id, &self.dag_id).await {
            Ok(table) => table,
            Err(err) if err.is_not_found() => return Ok(Table::new()),
            Err(err) => return Err(err.into()),
        };
        let runs = runs.filtered_eq("dag_run_state", &Value::String("success".to_string()));
        if runs.is_empty() {
            return Ok(Table::new());
        }

        let mut with_values = Table::new();
        for row in runs.rows() {
            let Some(run_id) = row.get("dag_run_id").and_then(Value::as_str) else {
                continue;
            };
            let raw = match client
                .get_xcom(&self.dag_id, run_id, &self.task_id, &self.xcom_key)
                .await
            {
                Ok(raw) => raw,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            };
            let values = extract_values(&raw)?;
            let mut row = row.clone();
            row.insert(self.refer_name.clone(), Value::Array(values));
            with_values.push(row);
        }

        let exploded = with_values.explode(&self.refer_name);
        let mut output_columns = base_scene_id_keys.to_vec();
        output_columns.push(self.refer_name.clone());
        Ok(exploded.select(&output_columns))
    }
}

/// Parse an xcom blob into its list of sub-keys.
///
/// The blob is a JSON array whose elements are scalars or single-key
/// mappings; a mapping contributes its lone value.
pub fn extract_values(input: &str) -> DomainResult<Vec<Value>> {
    let parsed: Value = serde_json::from_str(input)
        .map_err(|err| WatchError::Invariant(format!("xcom value is not valid JSON: {err}")))?;
    let Value::Array(items) = parsed else {
        return Err(WatchError::Invariant(format!(
            "xcom value should be a JSON list, got: {parsed}"
        )));
    };
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => map.into_iter().next().map_or(Value::Null, |(_, v)| v),
            other => other,
        })
        .collect())
}
