//! End-to-end watcher ticks against a mock orchestrator.

mod common;

use common::{client, dag_info_body, dag_run, dag_runs_body, task_instance_body, xcom_body, BATCH};
use crossdag::infrastructure::config::{SensorConfig, WatcherConfig, WatcherSpec};
use crossdag::services::registry;
use crossdag::services::watcher::{RunIdStyle, WatchAction, Watcher};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches a trigger body whose client-chosen run id starts with the
/// given prefix (time-suffixed styles are not byte-predictable).
struct RunIdPrefix(&'static str);

impl Match for RunIdPrefix {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| {
                body.get("dag_run_id")
                    .and_then(Value::as_str)
                    .map(|id| id.starts_with(self.0))
            })
            .unwrap_or(false)
    }
}

fn watcher_spec(dag_id: &str, scene_id_keys: &[&str], upstream: Vec<SensorConfig>) -> WatcherSpec {
    WatcherSpec {
        dag_id: dag_id.to_string(),
        scene_id_keys: scene_id_keys.iter().map(|k| (*k).to_string()).collect(),
        scene_id_dtypes: None,
        fixed_dag_run_conf: Map::new(),
        max_running_dag_runs: 3,
        triggered_dag_run_id_style: RunIdStyle::SceneIdKeysWithTime,
        watch_interval: 10,
        upstream,
    }
}

fn task_sensor_config(dag_id: &str, task_id: &str) -> SensorConfig {
    SensorConfig::TaskSensor {
        dag_id: dag_id.to_string(),
        task_id: task_id.to_string(),
        tolerate_missing_task_instances: false,
        base_scene_id_keys: None,
        expand_by: None,
        reduce_by: None,
    }
}

fn dag_sensor_config(dag_id: &str) -> SensorConfig {
    SensorConfig::DagSensor {
        dag_id: dag_id.to_string(),
        base_scene_id_keys: None,
        expand_by: None,
        reduce_by: None,
    }
}

fn plain_watcher(server: &MockServer, spec: WatcherSpec) -> Watcher {
    registry::build_watcher(&client(server), BATCH, WatcherConfig::Restapi(spec)).unwrap()
}

/// Upstream DAG `a` with one success run for scene `s1`, and its task
/// `t2` in success state.
async fn mount_ready_upstream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/a/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![dag_run(
            "a",
            "run_s1",
            "success",
            json!({"batch_id": BATCH, "scene_id": "s1"}),
        )])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/a/dagRuns/run_s1/taskInstances/t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_instance_body("t2", "success")))
        .mount(server)
        .await;
}

async fn mount_downstream_runs(server: &MockServer, dag_id: &str, runs: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/dags/{dag_id}/dagRuns")))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(runs)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn single_sensor_happy_path_triggers_the_ready_scene() {
    let server = MockServer::start().await;
    mount_ready_upstream(&server).await;
    mount_downstream_runs(&server, "d", vec![]).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_info_body("d", false)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/dags/d/dagRuns"))
        .and(body_partial_json(json!({
            "conf": {"batch_id": BATCH, "scene_id": "s1"},
        })))
        .and(RunIdPrefix("scene_id:s1__"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dag_run_id": "scene_id:s1__2024-01-01T00:00:00+00:00",
            "state": "queued",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let watcher = plain_watcher(
        &server,
        watcher_spec("d", &["scene_id"], vec![task_sensor_config("a", "t2")]),
    );

    let result = watcher.watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Trigger);
    assert_eq!(result.context["scene_id"], json!("s1"));

    watcher.trigger(&result.context).await.unwrap();
}

#[tokio::test]
async fn saturated_quota_idles_even_with_ready_scenes() {
    let server = MockServer::start().await;
    mount_ready_upstream(&server).await;
    let running = (2..5)
        .map(|n| {
            dag_run(
                "d",
                &format!("run_s{n}"),
                "running",
                json!({"batch_id": BATCH, "scene_id": format!("s{n}")}),
            )
        })
        .collect();
    mount_downstream_runs(&server, "d", running).await;

    let watcher = plain_watcher(
        &server,
        watcher_spec("d", &["scene_id"], vec![task_sensor_config("a", "t2")]),
    );

    let result = watcher.watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Idle);
}

#[tokio::test]
async fn an_already_triggered_scene_is_never_retriggered() {
    let server = MockServer::start().await;
    mount_ready_upstream(&server).await;
    mount_downstream_runs(
        &server,
        "d",
        vec![dag_run(
            "d",
            "scene_id:s1__2023-12-20T03:38:06+00:00",
            "success",
            json!({"batch_id": BATCH, "scene_id": "s1"}),
        )],
    )
    .await;

    let watcher = plain_watcher(
        &server,
        watcher_spec("d", &["scene_id"], vec![task_sensor_config("a", "t2")]),
    );

    let result = watcher.watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Idle);
}

/// Splitter DAG whose success run pushed [0, 1, 2, 3, 4] for scene x.
async fn mount_splitter(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/splitter/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![dag_run(
            "splitter",
            "split_run_x",
            "success",
            json!({"batch_id": BATCH, "scene_id": "x"}),
        )])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/dags/splitter/dagRuns/split_run_x/taskInstances/generate_split_map/xcomEntries/return_value",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(xcom_body(&json!([0, 1, 2, 3, 4]))))
        .mount(server)
        .await;
}

#[tokio::test]
async fn expanded_watcher_walks_the_sub_scenes_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/a/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![dag_run(
            "a",
            "run_x",
            "success",
            json!({"batch_id": BATCH, "scene_id": "x"}),
        )])))
        .mount(&server)
        .await;
    mount_splitter(&server).await;
    // Splits 0 and 1 already exist downstream, 1 still running.
    mount_downstream_runs(
        &server,
        "d_expanded",
        vec![
            dag_run(
                "d_expanded",
                "run_x_0",
                "success",
                json!({"batch_id": BATCH, "scene_id": "x", "split_id": 0}),
            ),
            dag_run(
                "d_expanded",
                "run_x_1",
                "running",
                json!({"batch_id": BATCH, "scene_id": "x", "split_id": 1}),
            ),
        ],
    )
    .await;

    let spec = watcher_spec("d_expanded", &["scene_id"], vec![dag_sensor_config("a")]);
    let watcher = registry::build_watcher(
        &client(&server),
        BATCH,
        WatcherConfig::ExpandableRestapi {
            spec,
            expand_by: crossdag::services::sensor::XComQuery {
                dag_id: "splitter".to_string(),
                task_id: "generate_split_map".to_string(),
                xcom_key: "return_value".to_string(),
                refer_name: "split_id".to_string(),
            },
        },
    )
    .unwrap();

    let result = watcher.watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Trigger);
    assert_eq!(result.context["scene_id"], json!("x"));
    assert_eq!(result.context["split_id"], json!(2));
}

/// Sub-scene runs of the expanded upstream DAG, one per split.
async fn mount_sub_scene_runs(server: &MockServer, states: &[&str]) {
    let runs = states
        .iter()
        .enumerate()
        .map(|(split, state)| {
            dag_run(
                "expanded_upstream",
                &format!("run_x_{split}"),
                state,
                json!({"batch_id": BATCH, "scene_id": "x", "split_id": split}),
            )
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/expanded_upstream/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(runs)))
        .mount(server)
        .await;
}

fn reducible_watcher(server: &MockServer) -> Watcher {
    let reduce_by = crossdag::services::sensor::XComQuery {
        dag_id: "splitter".to_string(),
        task_id: "generate_split_map".to_string(),
        xcom_key: "return_value".to_string(),
        refer_name: "split_id".to_string(),
    };
    let spec = watcher_spec(
        "d_reduced",
        &["scene_id", "split_id"],
        vec![SensorConfig::DagSensor {
            dag_id: "expanded_upstream".to_string(),
            base_scene_id_keys: Some(vec!["scene_id".to_string()]),
            expand_by: None,
            reduce_by: Some(reduce_by.clone()),
        }],
    );
    registry::build_watcher(
        &client(server),
        BATCH,
        WatcherConfig::ReducibleRestapi { spec, reduce_by },
    )
    .unwrap()
}

#[tokio::test]
async fn reduced_watcher_ignores_a_scene_with_a_failed_child() {
    let server = MockServer::start().await;
    mount_sub_scene_runs(&server, &["success", "success", "failed", "success", "success"]).await;
    mount_splitter(&server).await;
    mount_downstream_runs(&server, "d_reduced", vec![]).await;

    let result = reducible_watcher(&server).watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Idle);
}

#[tokio::test]
async fn reduced_watcher_triggers_the_parent_once_all_children_succeed() {
    let server = MockServer::start().await;
    mount_sub_scene_runs(&server, &["success"; 5]).await;
    mount_splitter(&server).await;
    mount_downstream_runs(&server, "d_reduced", vec![]).await;

    let result = reducible_watcher(&server).watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Trigger);
    // The context carries the downstream (reduced) coordinates only.
    assert_eq!(result.context["scene_id"], json!("x"));
    assert!(!result.context.contains_key("split_id"));
}

#[tokio::test]
async fn paused_target_logs_and_changes_nothing() {
    let server = MockServer::start().await;
    mount_ready_upstream(&server).await;
    mount_downstream_runs(&server, "d", vec![]).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_info_body("d", true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/dags/d/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .expect(0)
        .mount(&server)
        .await;

    let watcher = plain_watcher(
        &server,
        watcher_spec("d", &["scene_id"], vec![task_sensor_config("a", "t2")]),
    );

    // The trigger resolves as a paused no-op; the next tick still sees
    // no downstream run and decides to trigger again.
    for _ in 0..2 {
        let result = watcher.watch().await.unwrap();
        assert_eq!(result.action, WatchAction::Trigger);
        watcher.trigger(&result.context).await.unwrap();
    }
}

#[tokio::test]
async fn declared_dtypes_coerce_the_trigger_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/a/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![dag_run(
            "a",
            "run_42",
            "success",
            json!({"batch_id": BATCH, "scene_id": "42"}),
        )])))
        .mount(&server)
        .await;
    mount_downstream_runs(&server, "d", vec![]).await;

    let mut spec = watcher_spec("d", &["scene_id"], vec![dag_sensor_config("a")]);
    spec.scene_id_dtypes = Some(vec![crossdag::domain::scene::Dtype::Int]);
    let watcher = plain_watcher(&server, spec);

    let result = watcher.watch().await.unwrap();
    assert_eq!(result.action, WatchAction::Trigger);
    assert_eq!(result.context["scene_id"], json!(42));
}
