//! The per-DAG watcher: computes ready and existing scenes every tick and
//! decides whether to fire one new trigger.

pub mod run_id;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{error, info};

use crate::domain::errors::{DomainResult, WatchError};
use crate::domain::scene::{cell_matches, coerce, value_eq, Dtype, Scene};
use crate::domain::table::Table;
use crate::infrastructure::airflow::{AirflowClient, TriggerOutcome};
use crate::infrastructure::config::WatcherSpec;

use super::sensor::{UpstreamSensor, XComQuery};

pub use run_id::RunIdStyle;

/// What a tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Trigger,
    Idle,
    Error,
}

impl fmt::Display for WatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trigger => "trigger",
            Self::Idle => "idle",
            Self::Error => "error",
        })
    }
}

/// Outcome of one `watch` call: the action plus, for a trigger, the scene
/// map passed on to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchResult {
    pub action: WatchAction,
    pub context: Scene,
}

impl WatchResult {
    pub fn trigger(context: Scene) -> Self {
        Self {
            action: WatchAction::Trigger,
            context,
        }
    }

    pub fn idle() -> Self {
        Self {
            action: WatchAction::Idle,
            context: Scene::new(),
        }
    }

    pub fn error() -> Self {
        Self {
            action: WatchAction::Error,
            context: Scene::new(),
        }
    }
}

/// Scene topology of the downstream DAG relative to its upstream.
pub enum SceneTopology {
    /// Downstream scene keys equal the upstream scene keys.
    Plain,
    /// Downstream runs are keyed by the extra expansion dimension; the
    /// ready-set is fanned out through the query before triggering.
    Expanded(XComQuery),
    /// Downstream runs are keyed by the upstream keys minus the
    /// reduction dimension.
    Reduced(XComQuery),
}

/// A DAG run observed on the watcher's target DAG, projected onto the
/// downstream scene keys.
#[derive(Debug, Clone)]
pub struct ExistingScene {
    pub coords: Scene,
    pub state: String,
}

/// The periodic controller for one downstream DAG.
///
/// Stateless between ticks: every decision is derived from the
/// orchestrator's observable state at the start of the tick.
pub struct Watcher {
    client: Arc<AirflowClient>,
    batch_id: String,
    dag_id: String,
    scene_id_keys: Vec<String>,
    scene_id_dtypes: Option<Vec<Dtype>>,
    fixed_dag_run_conf: Map<String, Value>,
    max_running_dag_runs: usize,
    run_id_style: RunIdStyle,
    watch_interval: Duration,
    sensors: Vec<Box<dyn UpstreamSensor>>,
    topology: SceneTopology,
}

impl Watcher {
    pub fn new(
        client: Arc<AirflowClient>,
        batch_id: String,
        spec: WatcherSpec,
        sensors: Vec<Box<dyn UpstreamSensor>>,
        topology: SceneTopology,
    ) -> Self {
        Self {
            client,
            batch_id,
            dag_id: spec.dag_id,
            scene_id_keys: spec.scene_id_keys,
            scene_id_dtypes: spec.scene_id_dtypes,
            fixed_dag_run_conf: spec.fixed_dag_run_conf,
            max_running_dag_runs: spec.max_running_dag_runs,
            run_id_style: spec.triggered_dag_run_id_style,
            watch_interval: Duration::from_secs(spec.watch_interval),
            sensors,
            topology,
        }
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    /// The key-set downstream DAG runs are identified by.
    pub fn downstream_scene_id_keys(&self) -> Vec<String> {
        match &self.topology {
            SceneTopology::Plain => self.scene_id_keys.clone(),
            SceneTopology::Expanded(query) => {
                let mut keys = self.scene_id_keys.clone();
                keys.push(query.refer_name.clone());
                keys
            }
            SceneTopology::Reduced(query) => self
                .scene_id_keys
                .iter()
                .filter(|key| **key != query.refer_name)
                .cloned()
                .collect(),
        }
    }

    /// Run forever: tick, log, sleep. Every tick failure is contained
    /// here; the loop is never abandoned.
    pub async fn run(&self) {
        info!(
            dag_id = %self.dag_id,
            interval_secs = self.watch_interval.as_secs(),
            "watcher started"
        );
        loop {
            match self.tick().await {
                Ok(result) => info!(
                    dag_id = %self.dag_id,
                    action = %result.action,
                    context = ?result.context,
                    "watch result"
                ),
                Err(err) => error!(
                    dag_id = %self.dag_id,
                    action = %WatchAction::Error,
                    error = %err,
                    "watch tick failed"
                ),
            }
            sleep(self.watch_interval).await;
        }
    }

    async fn tick(&self) -> DomainResult<WatchResult> {
        let result = self.watch().await?;
        if result.action == WatchAction::Trigger {
            self.trigger(&result.context).await?;
        }
        Ok(result)
    }

    /// One tick's decision: at most one new trigger, chosen from the
    /// ready scenes that have no existing downstream run, under the
    /// running-runs quota.
    pub async fn watch(&self) -> DomainResult<WatchResult> {
        let ready = self.upstream_ready_scenes().await?;
        let ready = match &self.topology {
            SceneTopology::Expanded(query) if !ready.is_empty() => {
                self.expand_ready(ready, query).await?
            }
            _ => ready,
        };
        let existing = self.existing_scenes().await?;

        let running = existing.iter().filter(|e| e.state == "running").count();
        let quota = self.max_running_dag_runs.saturating_sub(running);
        if ready.is_empty() || quota == 0 {
            return Ok(WatchResult::idle());
        }

        let downstream_keys = self.downstream_scene_id_keys();
        for scene in ready {
            let candidate: Scene = downstream_keys
                .iter()
                .map(|key| {
                    (
                        key.clone(),
                        scene.get(key).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
            let already_triggered = existing.iter().any(|existing_scene| {
                downstream_keys.iter().all(|key| {
                    match (existing_scene.coords.get(key), candidate.get(key)) {
                        (Some(a), Some(b)) => value_eq(a, b),
                        _ => false,
                    }
                })
            });
            if !already_triggered {
                return Ok(WatchResult::trigger(self.coerce_scene(candidate)?));
            }
        }
        Ok(WatchResult::idle())
    }

    /// Scenes for which every configured sensor reports a success row.
    ///
    /// Sensor calls fan out concurrently; the set algebra runs on the
    /// combined snapshot only after all of them complete.
    async fn upstream_ready_scenes(&self) -> DomainResult<Vec<Scene>> {
        let senses = self.sensors.iter().map(|sensor| sensor.sense(Some("success")));
        let tables = try_join_all(senses).await?;
        let combined = Table::concat(tables);
        if combined.is_empty() {
            return Ok(Vec::new());
        }

        let mut ready = Vec::new();
        for (key_values, group) in combined.group_by(&self.scene_id_keys) {
            let mut all_matched = true;
            for sensor in &self.sensors {
                let query = sensor.query_key_values();
                let matched = group
                    .rows()
                    .iter()
                    .filter(|row| {
                        query.iter().all(|(column, expected)| {
                            row.get(column)
                                .is_some_and(|cell| cell_matches(cell, expected))
                        })
                    })
                    .count();
                // Only dag-discriminating sensors can assert uniqueness:
                // a static sensor's query matches any row of the batch.
                if matched > 1 && query.contains_key("dag_id") {
                    return Err(WatchError::Invariant(format!(
                        "scene {key_values:?} is matched by {matched} rows of upstream {query:?}"
                    )));
                }
                if matched == 0 {
                    all_matched = false;
                    break;
                }
            }
            if all_matched {
                ready.push(self.scene_id_keys.iter().cloned().zip(key_values).collect());
            }
        }
        Ok(ready)
    }

    /// Fan the ready-set out through the expansion query: one candidate
    /// per (ready scene, sub-key) pair.
    async fn expand_ready(&self, ready: Vec<Scene>, query: &XComQuery) -> DomainResult<Vec<Scene>> {
        let expansion = query
            .query(&self.client, &self.batch_id, &self.scene_id_keys)
            .await?;
        if expansion.is_empty() {
            return Ok(Vec::new());
        }
        let ready_table = Table::from_rows(ready);
        let merged = ready_table.inner_join(&expansion, &self.scene_id_keys);
        Ok(merged.into_rows())
    }

    /// All scenes a DAG run already exists for on the target DAG, any
    /// state, projected onto the downstream keys.
    pub async fn existing_scenes(&self) -> DomainResult<Vec<ExistingScene>> {
        let runs = self
            .client
            .list_dag_runs(&self.batch_id, &self.dag_id)
            .await?;
        let keys = self.downstream_scene_id_keys();
        Ok(runs
            .rows()
            .iter()
            .map(|row| ExistingScene {
                coords: keys
                    .iter()
                    .map(|key| (key.clone(), row.get(key).cloned().unwrap_or(Value::Null)))
                    .collect(),
                state: row
                    .get("dag_run_state")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    fn coerce_scene(&self, mut scene: Scene) -> DomainResult<Scene> {
        if let Some(dtypes) = &self.scene_id_dtypes {
            for (key, dtype) in self.scene_id_keys.iter().zip(dtypes) {
                if let Some(value) = scene.get(key) {
                    let coerced = coerce(value, *dtype)?;
                    scene.insert(key.clone(), coerced);
                }
            }
        }
        Ok(scene)
    }

    /// Submit the trigger for one scene.
    pub async fn trigger(&self, context: &Scene) -> DomainResult<()> {
        let mut conf = Map::new();
        conf.insert(
            "batch_id".to_string(),
            Value::String(self.batch_id.clone()),
        );
        for (key, value) in context {
            conf.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.fixed_dag_run_conf {
            conf.insert(key.clone(), value.clone());
        }
        for (key, value) in &conf {
            if value.is_array() || value.is_object() {
                return Err(WatchError::Invariant(format!(
                    "trigger payload field {key} is not a primitive: {value}"
                )));
            }
        }

        let run_id = self.run_id_style.derive(
            &self.batch_id,
            &self.downstream_scene_id_keys(),
            context,
            Utc::now(),
        );
        match self.client.trigger_dag(&self.dag_id, conf, run_id).await? {
            TriggerOutcome::Paused => {
                info!(dag_id = %self.dag_id, "target DAG is paused, skip triggering");
            }
            TriggerOutcome::Triggered(body) => {
                info!(
                    dag_id = %self.dag_id,
                    context = ?context,
                    response = %body,
                    "triggered dag run"
                );
            }
        }
        Ok(())
    }
}
