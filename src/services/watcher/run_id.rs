//! Derivation of client-chosen DAG-run identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::scene::Scene;

/// How the run id of a triggered DAG run is derived.
///
/// Scene-keyed styles without a time suffix make the orchestrator reject
/// duplicate triggers outright; time-suffixed styles are safe when more
/// than one watcher process shares a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunIdStyle {
    /// Let the orchestrator assign its own id.
    Timestamp,
    SceneIdKeys,
    #[default]
    SceneIdKeysWithTime,
    BatchIdSceneIdKeysWithTime,
}

impl RunIdStyle {
    /// Derive the run id for one trigger. `None` leaves the choice to
    /// the orchestrator.
    pub fn derive(
        self,
        batch_id: &str,
        scene_id_keys: &[String],
        scene: &Scene,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let scene_part = || {
            scene_id_keys
                .iter()
                .map(|key| {
                    format!(
                        "{key}:{}",
                        format_coordinate(scene.get(key).unwrap_or(&Value::Null))
                    )
                })
                .collect::<Vec<_>>()
                .join("__")
        };
        let time_part = || now.format("%Y-%m-%dT%H:%M:%S%:z").to_string();

        match self {
            Self::Timestamp => None,
            Self::SceneIdKeys => Some(scene_part()),
            Self::SceneIdKeysWithTime => Some(format!("{}__{}", scene_part(), time_part())),
            Self::BatchIdSceneIdKeysWithTime => Some(format!(
                "batch_id:{batch_id}__{}__{}",
                scene_part(),
                time_part()
            )),
        }
    }
}

fn format_coordinate(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
