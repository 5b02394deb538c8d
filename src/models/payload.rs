// Job payloads. These are the only state carried between job invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AggregationType;

/// Payload of a per-granularity aggregation job.
/// Wire shape: `{"type": <ordinal>, "partition": <int>, "date": "<ISO-8601>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationJobPayload {
    #[serde(rename = "type")]
    pub kind: AggregationType,
    pub partition: u32,
    pub date: DateTime<Utc>,
}

/// Payload of an audit job: re-walk `[from, to]` for one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditJobPayload {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AggregationType,
}
