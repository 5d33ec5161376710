//! Batch configuration: the YAML file declaring the watcher fleet.
//!
//! Sensor and watcher type tags form a closed registry implemented as
//! serde internally-tagged enums; unknown tags fail extraction.

pub mod loader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::scene::Dtype;
use crate::services::sensor::XComQuery;
use crate::services::watcher::RunIdStyle;

pub use loader::{ConfigError, ConfigLoader};

/// Top-level batch-config file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub logging: LogConfig,
    pub watchers: Vec<WatcherConfig>,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level (overridable via `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Stdout format.
    #[serde(default)]
    pub format: LogFormat,
    /// When set, JSON logs are also written to daily-rotated files here.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One watcher entry. The tag selects the scene topology of the
/// downstream DAG relative to its upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatcherConfig {
    /// Downstream scene keys equal the upstream scene keys.
    Restapi(WatcherSpec),
    /// Downstream keys gain the expansion dimension.
    ExpandableRestapi {
        #[serde(flatten)]
        spec: WatcherSpec,
        expand_by: XComQuery,
    },
    /// Downstream keys lose the reduction dimension.
    ReducibleRestapi {
        #[serde(flatten)]
        spec: WatcherSpec,
        reduce_by: XComQuery,
    },
}

impl WatcherConfig {
    pub fn spec(&self) -> &WatcherSpec {
        match self {
            Self::Restapi(spec)
            | Self::ExpandableRestapi { spec, .. }
            | Self::ReducibleRestapi { spec, .. } => spec,
        }
    }
}

/// Watcher fields shared by all topologies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSpec {
    /// Downstream DAG this watcher controls.
    pub dag_id: String,
    /// Ordered coordinate names identifying a scene.
    pub scene_id_keys: Vec<String>,
    /// Optional per-key coercion target, positionally matched to
    /// `scene_id_keys`.
    #[serde(default)]
    pub scene_id_dtypes: Option<Vec<Dtype>>,
    /// Extra fields merged into every trigger payload.
    #[serde(default)]
    pub fixed_dag_run_conf: Map<String, Value>,
    /// Concurrency cap for this watcher's DAG.
    #[serde(default = "default_max_running_dag_runs")]
    pub max_running_dag_runs: usize,
    #[serde(default)]
    pub triggered_dag_run_id_style: RunIdStyle,
    /// Poll period in seconds.
    #[serde(default = "default_watch_interval")]
    pub watch_interval: u64,
    pub upstream: Vec<SensorConfig>,
}

fn default_max_running_dag_runs() -> usize {
    3
}

fn default_watch_interval() -> u64 {
    10
}

/// One upstream sensor entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorConfig {
    /// Senses the state of upstream DAG runs.
    DagSensor {
        dag_id: String,
        #[serde(default)]
        base_scene_id_keys: Option<Vec<String>>,
        #[serde(default)]
        expand_by: Option<XComQuery>,
        #[serde(default)]
        reduce_by: Option<XComQuery>,
    },
    /// Senses the state of one task inside upstream DAG runs.
    TaskSensor {
        dag_id: String,
        task_id: String,
        /// Drop runs whose task instance does not exist instead of
        /// failing the tick.
        #[serde(default)]
        tolerate_missing_task_instances: bool,
        #[serde(default)]
        base_scene_id_keys: Option<Vec<String>>,
        #[serde(default)]
        expand_by: Option<XComQuery>,
        #[serde(default)]
        reduce_by: Option<XComQuery>,
    },
    /// Injects a fixed scene list from configuration.
    StaticSceneList {
        scene_list: Vec<Map<String, Value>>,
    },
}

impl SensorConfig {
    /// Upstream DAG this sensor probes, used for duplicate detection.
    ///
    /// The ready computation discriminates sensors by their
    /// `query_key_values`; a DAG probed by two sensors of one watcher
    /// would make that test ambiguous, so it is rejected up front.
    pub fn upstream_dag_id(&self) -> Option<&str> {
        match self {
            Self::DagSensor { dag_id, .. } | Self::TaskSensor { dag_id, .. } => Some(dag_id),
            Self::StaticSceneList { .. } => None,
        }
    }
}
