// Auditor tests: range walk, fetch-before-aggregate guard, one-shot mode, open windows, shutdown

mod common;

use chrono::{DateTime, TimeDelta, Utc};
use common::{RecordingAggregator, ts};
use rollupd::auditor::{AuditReport, Auditor, Clock};
use rollupd::models::Granularity;
use rollupd::partition::Partition;
use rollupd::shutdown;
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(2000);

fn auditor(agg: &Arc<RecordingAggregator>) -> Auditor {
    Auditor::new(agg.clone(), TICK)
}

/// Clock that starts at `base` and follows tokio's (pausable) time.
fn clock_from(base: DateTime<Utc>) -> Clock {
    let started = tokio::time::Instant::now();
    Arc::new(move || base + TimeDelta::from_std(started.elapsed()).unwrap())
}

#[tokio::test(start_paused = true)]
async fn hourly_range_aggregates_each_missing_partition() {
    let agg = Arc::new(RecordingAggregator::new());
    let report = auditor(&agg)
        .audit(
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-01T02:00:00Z"),
            Granularity::Hour,
            true,
        )
        .await;

    let numbers: Vec<u32> = agg.aggregated().iter().map(|p| p.number()).collect();
    assert_eq!(numbers, vec![0, 1]);
    assert_eq!(
        report,
        AuditReport {
            aggregated: 2,
            ..AuditReport::default()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn range_with_existing_rows_writes_nothing() {
    let existing = [
        Partition::new(Granularity::Hour, ts("2024-01-01T00:00:00Z")),
        Partition::new(Granularity::Hour, ts("2024-01-01T01:00:00Z")),
    ];
    let agg = Arc::new(RecordingAggregator::with_existing(existing));
    let report = auditor(&agg)
        .audit(
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-01T02:00:00Z"),
            Granularity::Hour,
            true,
        )
        .await;

    assert!(agg.aggregated().is_empty());
    assert_eq!(agg.fetch_count(), 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.aggregated, 0);
}

#[tokio::test]
async fn existing_rows_skip_write_for_every_granularity() {
    let from = ts("2024-03-10T05:30:00Z");
    for g in Granularity::ALL {
        let agg = Arc::new(RecordingAggregator::with_existing([Partition::new(g, from)]));
        let report = auditor(&agg)
            .audit(from, ts("2024-03-11T00:00:00Z"), g, false)
            .await;
        assert!(agg.aggregated().is_empty(), "{} wrote rows", g);
        assert_eq!(report.skipped, 1);
    }
}

#[tokio::test]
async fn one_shot_runs_only_the_first_partition() {
    let agg = Arc::new(RecordingAggregator::new());
    let report = auditor(&agg)
        .audit(
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-05T00:00:00Z"),
            Granularity::Day,
            false,
        )
        .await;

    assert_eq!(
        agg.aggregated(),
        vec![Partition::new(Granularity::Day, ts("2024-01-01T00:00:01Z"))]
    );
    assert_eq!(report.aggregated, 1);
}

#[tokio::test]
async fn one_shot_on_open_partition_does_nothing() {
    let agg = Arc::new(RecordingAggregator::new());
    let now = Utc::now();
    let report = auditor(&agg)
        .audit(now, now, Granularity::Month, false)
        .await;

    assert!(agg.aggregated().is_empty());
    assert_eq!(report, AuditReport::default());
}

#[tokio::test]
async fn one_shot_at_end_of_time_does_nothing() {
    let agg = Arc::new(RecordingAggregator::new());
    let end = DateTime::<Utc>::MAX_UTC;
    let report = auditor(&agg).audit(end, end, Granularity::Minute, false).await;

    assert!(agg.aggregated().is_empty());
    assert_eq!(report, AuditReport::default());
}

#[tokio::test(start_paused = true)]
async fn failures_are_counted_and_walk_continues() {
    let agg = Arc::new(RecordingAggregator::new());
    agg.set_failing(true);
    let report = auditor(&agg)
        .audit(
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-01T00:03:00Z"),
            Granularity::Minute,
            true,
        )
        .await;

    assert_eq!(report.failed, 3);
    assert_eq!(report.aggregated, 0);
}

#[tokio::test(start_paused = true)]
async fn keep_running_audit_stops_on_shutdown() {
    let agg = Arc::new(RecordingAggregator::new());
    let (tx, rx) = shutdown::channel();
    let auditor = Arc::new(auditor(&agg).with_shutdown(rx));

    // The month partition containing now never closes during the test.
    let now = Utc::now();
    let handle = {
        let auditor = auditor.clone();
        tokio::spawn(async move {
            auditor
                .audit(now, now + chrono::TimeDelta::days(400), Granularity::Month, true)
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    tx.send(true).unwrap();
    let report = handle.await.unwrap();

    assert!(report.cancelled);
    assert!(agg.aggregated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn open_partition_is_retried_until_it_closes() {
    let agg = Arc::new(RecordingAggregator::new());
    // Ticks land at 00:59:55, 00:59:57, 00:59:59 (open) and 01:00:01 (closed).
    let started = tokio::time::Instant::now();
    let auditor = auditor(&agg).with_clock(clock_from(ts("2024-01-01T00:59:55Z")));

    let report = auditor
        .audit(
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-01T01:00:00Z"),
            Granularity::Hour,
            true,
        )
        .await;

    assert_eq!(
        agg.aggregated(),
        vec![Partition::new(Granularity::Hour, ts("2024-01-01T00:00:00Z"))]
    );
    // Open ticks never touched storage.
    assert_eq!(agg.fetch_count(), 1);
    assert_eq!(report.aggregated, 1);
    assert_eq!(report.failed, 0);
    // The walk ended on the closing tick, not a tick later.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn cursor_advances_on_the_tick_a_partition_closes() {
    let agg = Arc::new(RecordingAggregator::new());
    // The first minute is long closed; the second closes on the third tick.
    let auditor = Arc::new(auditor(&agg).with_clock(clock_from(ts("2024-01-01T00:01:57Z"))));

    let handle = {
        let auditor = auditor.clone();
        tokio::spawn(async move {
            auditor
                .audit(
                    ts("2024-01-01T00:00:00Z"),
                    ts("2024-01-01T00:02:00Z"),
                    Granularity::Minute,
                    true,
                )
                .await
        })
    };

    // Tick at +0s aggregates 00:00; the tick at +2s sees 00:01 still open.
    tokio::time::sleep(Duration::from_millis(3000)).await;
    let first = Partition::new(Granularity::Minute, ts("2024-01-01T00:00:00Z"));
    assert_eq!(agg.aggregated(), vec![first]);

    // Tick at +4s (00:02:01) closes 00:01 and ends the walk.
    let report = handle.await.unwrap();
    assert_eq!(agg.aggregated(), vec![first, first.increment()]);
    assert_eq!(report.aggregated, 2);
}
