//! Construction of watchers and sensors from their config type tags.
//!
//! This is the only dispatch point in the system: the closed set of tags
//! accepted by the config enums maps here to concrete variants.

use std::sync::Arc;

use crate::infrastructure::airflow::AirflowClient;
use crate::infrastructure::config::{ConfigError, SensorConfig, WatcherConfig};

use super::sensor::{
    DagSensor, Expand, Reduce, StaticSceneListSensor, TaskSensor, UpstreamSensor, XComQuery,
};
use super::watcher::{SceneTopology, Watcher};

/// Build one watcher, including its sensor stack.
pub fn build_watcher(
    client: &Arc<AirflowClient>,
    batch_id: &str,
    config: WatcherConfig,
) -> Result<Watcher, ConfigError> {
    let (mut spec, topology) = match config {
        WatcherConfig::Restapi(spec) => (spec, SceneTopology::Plain),
        WatcherConfig::ExpandableRestapi { spec, expand_by } => {
            (spec, SceneTopology::Expanded(expand_by))
        }
        WatcherConfig::ReducibleRestapi { spec, reduce_by } => {
            (spec, SceneTopology::Reduced(reduce_by))
        }
    };

    let upstream = std::mem::take(&mut spec.upstream);
    let mut sensors = Vec::with_capacity(upstream.len());
    for sensor_config in upstream {
        sensors.push(build_sensor(client, batch_id, &spec.dag_id, sensor_config)?);
    }

    Ok(Watcher::new(
        client.clone(),
        batch_id.to_string(),
        spec,
        sensors,
        topology,
    ))
}

/// Build one sensor, wrapping it in an Expand/Reduce decorator when the
/// entry carries a transform.
pub fn build_sensor(
    client: &Arc<AirflowClient>,
    batch_id: &str,
    watcher_dag_id: &str,
    config: SensorConfig,
) -> Result<Box<dyn UpstreamSensor>, ConfigError> {
    match config {
        SensorConfig::DagSensor {
            dag_id,
            base_scene_id_keys,
            expand_by,
            reduce_by,
        } => {
            let base: Box<dyn UpstreamSensor> = Box::new(DagSensor::new(
                client.clone(),
                batch_id.to_string(),
                dag_id.clone(),
            ));
            decorate(
                base,
                client,
                batch_id,
                watcher_dag_id,
                &dag_id,
                base_scene_id_keys,
                expand_by,
                reduce_by,
            )
        }
        SensorConfig::TaskSensor {
            dag_id,
            task_id,
            tolerate_missing_task_instances,
            base_scene_id_keys,
            expand_by,
            reduce_by,
        } => {
            let base: Box<dyn UpstreamSensor> = Box::new(TaskSensor::new(
                client.clone(),
                batch_id.to_string(),
                dag_id.clone(),
                task_id,
                tolerate_missing_task_instances,
            ));
            decorate(
                base,
                client,
                batch_id,
                watcher_dag_id,
                &dag_id,
                base_scene_id_keys,
                expand_by,
                reduce_by,
            )
        }
        SensorConfig::StaticSceneList { scene_list } => Ok(Box::new(
            StaticSceneListSensor::new(batch_id.to_string(), scene_list),
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn decorate(
    inner: Box<dyn UpstreamSensor>,
    client: &Arc<AirflowClient>,
    batch_id: &str,
    watcher_dag_id: &str,
    upstream_dag_id: &str,
    base_scene_id_keys: Option<Vec<String>>,
    expand_by: Option<XComQuery>,
    reduce_by: Option<XComQuery>,
) -> Result<Box<dyn UpstreamSensor>, ConfigError> {
    let missing_base_keys = || ConfigError::MissingBaseSceneIdKeys {
        dag_id: watcher_dag_id.to_string(),
        upstream: upstream_dag_id.to_string(),
    };
    match (expand_by, reduce_by) {
        (None, None) => Ok(inner),
        (Some(_), Some(_)) => Err(ConfigError::SensorTransformConflict {
            dag_id: watcher_dag_id.to_string(),
            upstream: upstream_dag_id.to_string(),
        }),
        (Some(query), None) => {
            let keys = base_scene_id_keys.ok_or_else(missing_base_keys)?;
            Ok(Box::new(Expand::new(
                inner,
                client.clone(),
                batch_id.to_string(),
                query,
                keys,
            )))
        }
        (None, Some(query)) => {
            let keys = base_scene_id_keys.ok_or_else(missing_base_keys)?;
            Ok(Box::new(Reduce::new(
                inner,
                client.clone(),
                batch_id.to_string(),
                query,
                keys,
            )))
        }
    }
}
