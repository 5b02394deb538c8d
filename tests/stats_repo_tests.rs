// StatsRepo tests: event validation, rollup counts, window bounds, idempotent writes

mod common;

use common::ts;
use rollupd::aggregator::{AggregationOutcome, StatsAggregator, aggregate_if_missing};
use rollupd::db;
use rollupd::models::{Granularity, LogEvent};
use rollupd::partition::Partition;
use rollupd::stats_repo::StatsRepo;
use tempfile::TempDir;

async fn repo(dir: &TempDir) -> StatsRepo {
    let path = dir.path().join("stats.db");
    let pool = db::connect(path.to_str().unwrap(), 2).await.unwrap();
    let repo = StatsRepo::new(pool);
    repo.init().await.unwrap();
    repo
}

fn event(at: &str, visitor: &str, session: &str) -> LogEvent {
    LogEvent {
        event: "page_view".into(),
        kind: "web".into(),
        time: ts(at).timestamp(),
        visitor_id: visitor.into(),
        session_id: session.into(),
        data: None,
    }
}

#[tokio::test]
async fn stats_repo_init_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;
    repo.init().await.unwrap();
}

#[tokio::test]
async fn log_event_rejects_missing_fields() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;

    let mut bad = event("2024-01-01T10:00:00Z", "v1", "s1");
    bad.visitor_id.clear();
    let err = repo.log_event(&bad).await.unwrap_err();
    assert!(err.to_string().contains("visitorId"));

    let mut bad = event("2024-01-01T10:00:00Z", "v1", "s1");
    bad.event.clear();
    assert!(repo.log_event(&bad).await.is_err());

    assert!(repo.log_event(&event("2024-01-01T10:00:00Z", "v1", "s1")).await.is_ok());
}

#[tokio::test]
async fn aggregate_counts_events_inside_window() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;
    for e in [
        event("2024-01-01T10:00:00Z", "v1", "s1"),
        event("2024-01-01T10:15:00Z", "v1", "s1"),
        event("2024-01-01T10:59:59Z", "v2", "s2"),
        event("2024-01-01T11:00:00Z", "v3", "s3"),
        event("2024-01-01T09:59:59Z", "v4", "s4"),
    ] {
        repo.log_event(&e).await.unwrap();
    }

    let partition = Partition::new(Granularity::Hour, ts("2024-01-01T10:30:00Z"));
    assert!(repo.fetch_stats(&partition).await.unwrap().is_empty());
    repo.aggregate_stats(&partition).await.unwrap();

    let rows = repo.fetch_stats(&partition).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.granularity, 1);
    assert_eq!(row.partition, 10);
    assert_eq!(row.period_start, partition.start().timestamp());
    assert_eq!(row.events, 3);
    assert_eq!(row.visitors, 2);
    assert_eq!(row.sessions, 2);
    assert!(row.collected_at > 0);
}

#[tokio::test]
async fn empty_window_gets_zero_row() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;
    let partition = Partition::new(Granularity::Day, ts("2024-02-29T12:00:00Z"));

    repo.aggregate_stats(&partition).await.unwrap();

    let rows = repo.fetch_stats(&partition).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].events, 0);
    assert_eq!(rows[0].partition, 29);
}

#[tokio::test]
async fn second_aggregation_keeps_one_row() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;
    repo.log_event(&event("2024-03-01T00:00:05Z", "v1", "s1"))
        .await
        .unwrap();
    let partition = Partition::new(Granularity::Minute, ts("2024-03-01T00:00:30Z"));

    repo.aggregate_stats(&partition).await.unwrap();
    repo.log_event(&event("2024-03-01T00:00:40Z", "v2", "s2"))
        .await
        .unwrap();
    repo.aggregate_stats(&partition).await.unwrap();

    let rows = repo.fetch_stats(&partition).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].events, 1);
}

#[tokio::test]
async fn granularities_are_stored_separately() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;
    let at = ts("2024-01-01T00:00:00Z");
    let hour = Partition::new(Granularity::Hour, at);
    let day = Partition::new(Granularity::Day, at);

    repo.aggregate_stats(&hour).await.unwrap();
    assert!(repo.fetch_stats(&day).await.unwrap().is_empty());
    repo.aggregate_stats(&day).await.unwrap();
    assert_eq!(repo.fetch_stats(&day).await.unwrap()[0].granularity, 2);
}

#[tokio::test]
async fn aggregate_if_missing_skips_existing_rows() {
    let dir = TempDir::new().unwrap();
    let repo = repo(&dir).await;
    let partition = Partition::new(Granularity::Month, ts("2024-01-15T00:00:00Z"));

    let first = aggregate_if_missing(&repo, "rollup_monthly_stats", partition)
        .await
        .unwrap();
    let second = aggregate_if_missing(&repo, "rollup_monthly_stats", partition)
        .await
        .unwrap();
    assert_eq!(first, AggregationOutcome::Aggregated);
    assert_eq!(second, AggregationOutcome::AlreadyCollected);
}
