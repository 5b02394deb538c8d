// Typed errors for job payloads and CLI input. Everything else propagates as anyhow.

use crate::models::AggregationType;

/// A job that cannot be turned into work. The job is abandoned and no successor is enqueued.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown aggregation type ordinal {0}")]
    UnknownAggregationType(u8),

    #[error("unsupported type of aggregation: {0}")]
    UnsupportedGranularity(AggregationType),

    #[error("job '{job}' cannot run {kind} partitions")]
    GranularityMismatch { job: String, kind: AggregationType },

    #[error("unknown job name '{0}'")]
    UnknownJob(String),

    #[error("malformed payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Invalid or missing `audit` command arguments.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("'--{0}' is required")]
    Missing(&'static str),

    #[error("invalid '--{flag}' value '{value}'")]
    InvalidDate { flag: &'static str, value: String },

    #[error("invalid '--type' is given, acceptable types: minutely,hourly,daily,monthly")]
    InvalidType(String),
}
