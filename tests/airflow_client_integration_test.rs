//! Integration tests for the orchestrator client against a mock server.

mod common;

use common::{
    client, dag_info_body, dag_run, dag_runs_body, task_instance_body, xcom_body, BATCH, SESSION,
};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn list_dag_runs_filters_batch_and_flattens_conf() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/upstream/dagRuns"))
        .and(header("cookie", format!("session={SESSION}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![
            dag_run(
                "upstream",
                "manual__2023-12-20T03:38:06+00:00",
                "success",
                json!({"batch_id": BATCH, "scene_id": "20231220_1101"}),
            ),
            dag_run(
                "upstream",
                "fixed_a001",
                "failed",
                json!({"batch_id": "another_batch", "scene_id": "underground_1220"}),
            ),
            dag_run("upstream", "fixed_a002", "running", json!({})),
        ])))
        .mount(&server)
        .await;

    let table = client(&server)
        .list_dag_runs(BATCH, "upstream")
        .await
        .unwrap();

    assert_eq!(table.len(), 1);
    let row = &table.rows()[0];
    assert_eq!(row["dag_id"], json!("upstream"));
    assert_eq!(row["dag_run_id"], json!("manual__2023-12-20T03:38:06+00:00"));
    assert_eq!(row["dag_run_state"], json!("success"));
    assert_eq!(row["scene_id"], json!("20231220_1101"));
    assert_eq!(row["batch_id"], json!(BATCH));
}

#[tokio::test]
async fn empty_dag_run_list_is_an_empty_row_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/upstream/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![])))
        .mount(&server)
        .await;

    let table = client(&server)
        .list_dag_runs(BATCH, "upstream")
        .await
        .unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn task_instance_view_is_trimmed_to_join_columns() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/dags/upstream/dagRuns/fixed_a001/taskInstances/fisheye.task_inside_2",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(task_instance_body("fisheye.task_inside_2", "success")),
        )
        .mount(&server)
        .await;

    let row = client(&server)
        .get_task_instance("upstream", "fixed_a001", "fisheye.task_inside_2")
        .await
        .unwrap();

    assert_eq!(row["dag_id"], json!("upstream"));
    assert_eq!(row["dag_run_id"], json!("fixed_a001"));
    assert_eq!(row["task_id"], json!("fisheye.task_inside_2"));
    assert_eq!(row["task_instance_state"], json!("success"));
    assert!(!row.contains_key("try_number"));
}

#[tokio::test]
async fn missing_task_instance_is_not_found_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/dags/upstream/dagRuns/fixed_a001/taskInstances/no_such_task",
        ))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "detail": "Task instance not found",
        })))
        // The retry policy is status-blind: even a 404 burns the budget.
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .get_task_instance("upstream", "fixed_a001", "no_such_task")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn transient_500_is_retried_to_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/upstream/dagRuns"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/upstream/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_runs_body(vec![dag_run(
            "upstream",
            "fixed_a001",
            "success",
            json!({"batch_id": BATCH, "scene_id": "s1"}),
        )])))
        .mount(&server)
        .await;

    let table = client(&server)
        .list_dag_runs(BATCH, "upstream")
        .await
        .unwrap();
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn get_xcom_returns_the_raw_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/dags/splitter/dagRuns/fixed_a001/taskInstances/generate_split_map/xcomEntries/return_value",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(xcom_body(&json!([0, 1, 2]))))
        .mount(&server)
        .await;

    let raw = client(&server)
        .get_xcom("splitter", "fixed_a001", "generate_split_map", "return_value")
        .await
        .unwrap();
    assert_eq!(raw, "[0,1,2]");
}

#[tokio::test]
async fn trigger_posts_payload_and_run_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/downstream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_info_body("downstream", false)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/dags/downstream/dagRuns"))
        .and(body_partial_json(json!({
            "dag_run_id": "scene_id:s1",
            "conf": {"batch_id": BATCH, "scene_id": "s1"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dag_run_id": "scene_id:s1",
            "state": "queued",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut conf = Map::new();
    conf.insert("batch_id".to_string(), json!(BATCH));
    conf.insert("scene_id".to_string(), json!("s1"));
    let outcome = client(&server)
        .trigger_dag("downstream", conf, Some("scene_id:s1".to_string()))
        .await
        .unwrap();

    match outcome {
        crossdag::infrastructure::airflow::TriggerOutcome::Triggered(body) => {
            assert_eq!(body["state"], json!("queued"));
        }
        other => panic!("expected a trigger, got {other:?}"),
    }
}

#[tokio::test]
async fn paused_dag_short_circuits_without_posting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dags/downstream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_info_body("downstream", true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/dags/downstream/dagRuns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = client(&server)
        .trigger_dag("downstream", Map::new(), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        crossdag::infrastructure::airflow::TriggerOutcome::Paused
    ));
}
