//! Fan-in transform: sub-scenes on one dimension collapse into their
//! parent scene with conjunctive success semantics.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::table::{Row, Table};
use crate::infrastructure::airflow::AirflowClient;

use super::{UpstreamSensor, XComQuery};

/// Decorates a sensor so that all sub-scenes sharing the base scene keys
/// collapse into one row whose `state` is `success` iff every expansion
/// sub-key reported success.
///
/// The base row-set is outer-joined with the expansion on
/// `base_scene_id_keys + [refer_name]`: a sub-key present in the
/// expansion but missing from the sensor's result joins with a null
/// `state`, which counts as a failure in the aggregation.
pub struct Reduce {
    inner: Box<dyn UpstreamSensor>,
    client: Arc<AirflowClient>,
    batch_id: String,
    query: XComQuery,
    base_scene_id_keys: Vec<String>,
}

impl Reduce {
    pub fn new(
        inner: Box<dyn UpstreamSensor>,
        client: Arc<AirflowClient>,
        batch_id: String,
        query: XComQuery,
        base_scene_id_keys: Vec<String>,
    ) -> Self {
        Self {
            inner,
            client,
            batch_id,
            query,
            base_scene_id_keys,
        }
    }
}

#[async_trait]
impl UpstreamSensor for Reduce {
    async fn sense(&self, desired_state: Option<&str>) -> DomainResult<Table> {
        let base = self.inner.sense(desired_state).await?;
        let expansion = self
            .query
            .query(&self.client, &self.batch_id, &self.base_scene_id_keys)
            .await?;
        if expansion.is_empty() {
            return Ok(Table::new());
        }

        let mut expanded_keys = self.base_scene_id_keys.clone();
        expanded_keys.push(self.query.refer_name.clone());
        let merged = base.outer_join(&expansion, &expanded_keys);
        let reduced = aggregate_conjunctive(&merged, &self.base_scene_id_keys);

        Ok(match desired_state {
            Some(state) => reduced.filtered_eq("state", &Value::String(state.to_string())),
            None => reduced,
        })
    }

    fn query_key_values(&self) -> BTreeMap<String, Value> {
        self.inner.query_key_values()
    }
}

/// Group by the base scene keys; every other column (the reduction
/// dimension included) aggregates to the list of member values, and
/// `state` aggregates conjunctively (a missing or null member state is a
/// failure).
fn aggregate_conjunctive(merged: &Table, group_keys: &[String]) -> Table {
    let columns = merged.columns();
    let mut out = Table::new();
    for (key_values, group) in merged.group_by(group_keys) {
        let mut row: Row = group_keys
            .iter()
            .cloned()
            .zip(key_values)
            .collect();
        for column in &columns {
            if group_keys.contains(column) || column == "state" {
                continue;
            }
            let members = group
                .rows()
                .iter()
                .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
                .collect();
            row.insert(column.clone(), Value::Array(members));
        }
        let all_success = group.rows().iter().all(|r| {
            r.get("state")
                .and_then(Value::as_str)
                .is_some_and(|s| s == "success")
        });
        let state = if all_success { "success" } else { "failed" };
        row.insert("state".to_string(), Value::String(state.to_string()));
        out.push(row);
    }
    out
}
