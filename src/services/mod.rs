//! The watcher engine: upstream sensors, their Expand/Reduce transforms,
//! and the per-DAG watcher control loop.

pub mod registry;
pub mod sensor;
pub mod watcher;
