//! Crossdag - derived-workflow scheduler.
//!
//! A long-running controller that observes an Airflow-compatible
//! orchestrator over its REST API and, for each scene whose upstream
//! dependencies have all succeeded, triggers a downstream DAG run
//! exactly once, bounded by a per-DAG concurrency cap:
//! - Sensors probe upstream DAG runs, task instances, or static lists
//! - Expand/Reduce transforms fan scenes out and back in via xcoms
//! - One watcher loop per downstream DAG, stateless between ticks

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
