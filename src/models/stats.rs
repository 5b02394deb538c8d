// Raw events and rolled-up rows.

use serde::{Deserialize, Serialize};

/// One tracked event as written by the ingestion side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub event: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Unix seconds.
    pub time: i64,
    pub visitor_id: String,
    pub session_id: String,
    #[serde(default)]
    pub data: Option<f64>,
}

/// One aggregated row for a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRow {
    /// AggregationType ordinal.
    pub granularity: u8,
    /// Partition start, unix seconds.
    pub period_start: i64,
    pub partition: u32,
    pub visitors: i64,
    pub sessions: i64,
    pub events: i64,
    /// Unix milliseconds.
    pub collected_at: i64,
}
