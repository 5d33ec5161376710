//! Fan-out transform: one upstream scene becomes many derived scenes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::table::Table;
use crate::infrastructure::airflow::AirflowClient;

use super::{UpstreamSensor, XComQuery};

/// Decorates a sensor so that each upstream scene yields one derived
/// scene per sub-key produced by the query: an inner join of the base
/// row-set with the expansion on the base scene keys.
///
/// An empty expansion means nothing is derived yet, so the result is
/// empty no matter what the base sensor reports.
pub struct Expand {
    inner: Box<dyn UpstreamSensor>,
    client: Arc<AirflowClient>,
    batch_id: String,
    query: XComQuery,
    base_scene_id_keys: Vec<String>,
}

impl Expand {
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
impl UpstreamSensor for Expand {
    async fn sense(&self, desired_state: Option<&str>) -> DomainResult<Table> {
        let base = self.inner.sense(desired_state).await?;
        if base.is_empty() {
            return Ok(base);
        }
        let expansion = self
            .query
            .query(&self.client, &self.batch_id, &self.base_scene_id_keys)
            .await?;
        if expansion.is_empty() {
            return Ok(Table::new());
        }
        Ok(base.inner_join(&expansion, &self.base_scene_id_keys))
    }

    fn query_key_values(&self) -> BTreeMap<String, Value> {
        self.inner.query_key_values()
    }
}
