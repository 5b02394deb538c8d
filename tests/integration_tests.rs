// Integration tests: HTTP status endpoints

use axum_test::TestServer;
use rollupd::models::{AggregationJobPayload, AggregationType, HOURLY_JOB};
use rollupd::queue::{InMemoryJobQueue, JobQueue, NewJob};
use rollupd::routes;
use std::sync::Arc;

fn test_server() -> (TestServer, Arc<InMemoryJobQueue>) {
    let queue = Arc::new(InMemoryJobQueue::new());
    let server = TestServer::new(routes::app(queue.clone())).unwrap();
    (server, queue)
}

#[tokio::test]
async fn test_root_returns_banner() {
    let (server, _) = test_server();
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("rollupd: calendar rollup scheduler");
}

#[tokio::test]
async fn test_version_returns_name_and_version() {
    let (server, _) = test_server();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("rollupd")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_health_ok() {
    let (server, _) = test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_delayed_jobs_lists_pending_jobs() {
    let (server, queue) = test_server();
    let payload = AggregationJobPayload {
        kind: AggregationType::Hourly,
        partition: 7,
        date: chrono::DateTime::from_timestamp(1_704_092_400, 0).unwrap(),
    };
    queue
        .enqueue(NewJob::new(HOURLY_JOB, &payload).unwrap())
        .await
        .unwrap();

    let response = server.get(&format!("/jobs/{}/delayed", HOURLY_JOB)).await;
    response.assert_status_ok();
    let jobs: serde_json::Value = response.json();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["name"], HOURLY_JOB);
    assert_eq!(jobs[0]["priority"], "normal");
    assert_eq!(jobs[0]["payload"]["type"], 1);
    assert_eq!(jobs[0]["payload"]["partition"], 7);
}

#[tokio::test]
async fn test_delayed_jobs_empty_for_unknown_name() {
    let (server, _) = test_server();
    let response = server.get("/jobs/nothing/delayed").await;
    response.assert_status_ok();
    let jobs: serde_json::Value = response.json();
    assert_eq!(jobs, serde_json::json!([]));
}
