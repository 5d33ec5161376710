//! Sensor injecting a fixed scene list from configuration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::errors::DomainResult;
use crate::domain::table::{Row, Table};

use super::UpstreamSensor;

/// A sensor whose upstream is configuration itself: every listed scene is
/// permanently in `success` state. Used to inject a fixed fan-out.
pub struct StaticSceneListSensor {
    batch_id: String,
    scene_list: Vec<Map<String, Value>>,
}

impl StaticSceneListSensor {
    pub fn new(batch_id: String, scene_list: Vec<Map<String, Value>>) -> Self {
        Self {
            batch_id,
            scene_list,
        }
    }
}

#[async_trait]
impl UpstreamSensor for StaticSceneListSensor {
    async fn sense(&self, desired_state: Option<&str>) -> DomainResult<Table> {
        let mut table = Table::new();
        for scene in &self.scene_list {
            let mut row: Row = scene
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            row.insert(
                "batch_id".to_string(),
                Value::String(self.batch_id.clone()),
            );
            row.insert("state".to_string(), Value::String("success".to_string()));
            table.push(row);
        }
        Ok(match desired_state {
            Some(state) => table.filtered_eq("state", &Value::String(state.to_string())),
            None => table,
        })
    }

    fn query_key_values(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([(
            "batch_id".to_string(),
            Value::String(self.batch_id.clone()),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor() -> StaticSceneListSensor {
        let scenes = vec![
            json!({"scene_id": "20231220_1101"}),
            json!({"scene_id": "underground_1220"}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();
        StaticSceneListSensor::new("a_batch".to_string(), scenes)
    }

    #[tokio::test]
    async fn tags_batch_and_success_state() {
        let table = sensor().sense(Some("success")).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0]["batch_id"], json!("a_batch"));
        assert_eq!(table.rows()[0]["state"], json!("success"));
    }

    #[tokio::test]
    async fn filtering_on_other_states_is_empty() {
        let table = sensor().sense(Some("failed")).await.unwrap();
        assert!(table.is_empty());
    }
}
