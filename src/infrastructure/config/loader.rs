//! Batch-config loading and validation.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use thiserror::Error;

use super::{BatchConfig, SensorConfig, WatcherConfig};

/// Configuration error types. All fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("watcher {dag_id}: scene_id_keys must not be empty")]
    EmptySceneIdKeys { dag_id: String },

    #[error("watcher {dag_id}: scene_id_dtypes has {dtypes} entries for {keys} scene_id_keys")]
    DtypeLengthMismatch {
        dag_id: String,
        keys: usize,
        dtypes: usize,
    },

    #[error("watcher {dag_id}: max_running_dag_runs must be at least 1")]
    InvalidMaxRunningDagRuns { dag_id: String },

    #[error("watcher {dag_id}: watch_interval must be at least 1 second")]
    InvalidWatchInterval { dag_id: String },

    #[error("watcher {dag_id}: upstream {upstream} appears more than once")]
    DuplicateUpstream { dag_id: String, upstream: String },

    #[error("watcher {dag_id}: sensor on {upstream} sets both expand_by and reduce_by")]
    SensorTransformConflict { dag_id: String, upstream: String },

    #[error(
        "watcher {dag_id}: sensor on {upstream} needs base_scene_id_keys for expand_by/reduce_by"
    )]
    MissingBaseSceneIdKeys { dag_id: String, upstream: String },

    #[error("watcher {dag_id}: reduce_by.refer_name {refer_name} is not one of scene_id_keys")]
    ReferNameNotASceneKey { dag_id: String, refer_name: String },

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Loads the batch-config file and validates it.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from a YAML file, with `CROSSDAG_`-prefixed environment
    /// variables taking precedence.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<BatchConfig> {
        let config: BatchConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CROSSDAG_").split("__"))
            .extract()
            .context(format!(
                "Failed to load batch config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a parsed config.
    pub fn validate(config: &BatchConfig) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        for watcher in &config.watchers {
            Self::validate_watcher(watcher)?;
        }
        Ok(())
    }

    fn validate_watcher(watcher: &WatcherConfig) -> Result<(), ConfigError> {
        let spec = watcher.spec();
        let dag_id = spec.dag_id.clone();

        if spec.scene_id_keys.is_empty() {
            return Err(ConfigError::EmptySceneIdKeys { dag_id });
        }
        if let Some(dtypes) = &spec.scene_id_dtypes {
            if dtypes.len() != spec.scene_id_keys.len() {
                return Err(ConfigError::DtypeLengthMismatch {
                    dag_id,
                    keys: spec.scene_id_keys.len(),
                    dtypes: dtypes.len(),
                });
            }
        }
        if spec.max_running_dag_runs == 0 {
            return Err(ConfigError::InvalidMaxRunningDagRuns { dag_id });
        }
        if spec.watch_interval == 0 {
            return Err(ConfigError::InvalidWatchInterval { dag_id });
        }

        if let WatcherConfig::ReducibleRestapi { spec, reduce_by } = watcher {
            if !spec.scene_id_keys.contains(&reduce_by.refer_name) {
                return Err(ConfigError::ReferNameNotASceneKey {
                    dag_id: spec.dag_id.clone(),
                    refer_name: reduce_by.refer_name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for sensor in &spec.upstream {
            if let Some(upstream) = sensor.upstream_dag_id() {
                if !seen.insert(upstream.to_string()) {
                    return Err(ConfigError::DuplicateUpstream {
                        dag_id: dag_id.clone(),
                        upstream: upstream.to_string(),
                    });
                }
            }
            Self::validate_sensor(&spec.dag_id, sensor)?;
        }
        Ok(())
    }

    fn validate_sensor(watcher_dag_id: &str, sensor: &SensorConfig) -> Result<(), ConfigError> {
        let (upstream, base_keys, expand_by, reduce_by) = match sensor {
            SensorConfig::DagSensor {
                dag_id,
                base_scene_id_keys,
                expand_by,
                reduce_by,
            }
            | SensorConfig::TaskSensor {
                dag_id,
                base_scene_id_keys,
                expand_by,
                reduce_by,
                ..
            } => (dag_id, base_scene_id_keys, expand_by, reduce_by),
            SensorConfig::StaticSceneList { .. } => return Ok(()),
        };

        if expand_by.is_some() && reduce_by.is_some() {
            return Err(ConfigError::SensorTransformConflict {
                dag_id: watcher_dag_id.to_string(),
                upstream: upstream.clone(),
            });
        }
        if (expand_by.is_some() || reduce_by.is_some()) && base_keys.is_none() {
            return Err(ConfigError::MissingBaseSceneIdKeys {
                dag_id: watcher_dag_id.to_string(),
                upstream: upstream.clone(),
            });
        }
        Ok(())
    }
}
