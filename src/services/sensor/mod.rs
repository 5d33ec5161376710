//! Upstream sensors.
//!
//! A sensor is a probe over the orchestrator's observable state: given a
//! desired outcome it yields a row-set of upstream units keyed by scene
//! coordinates. The `Expand`/`Reduce` decorators compose with any sensor
//! through an [`XComQuery`].

pub mod dag_sensor;
pub mod expand;
pub mod reduce;
pub mod static_scene_list;
pub mod task_sensor;
pub mod xcom_query;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::table::Table;

pub use dag_sensor::DagSensor;
pub use expand::Expand;
pub use reduce::Reduce;
pub use static_scene_list::StaticSceneListSensor;
pub use task_sensor::TaskSensor;
pub use xcom_query::{extract_values, XComQuery};

/// A probe over upstream orchestrator state.
#[async_trait]
pub trait UpstreamSensor: Send + Sync {
    /// Fetch the upstream row-set, filtered to `desired_state` when given.
    ///
    /// Every returned row carries a synthesized `state` column holding
    /// the outcome the watcher's ready computation inspects.
    async fn sense(&self, desired_state: Option<&str>) -> DomainResult<Table>;

    /// The columns (and their values) that identify this sensor's rows
    /// inside a combined row-set.
    fn query_key_values(&self) -> BTreeMap<String, Value>;
}
