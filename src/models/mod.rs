// Domain models

mod granularity;
mod payload;
mod stats;

pub use granularity::{
    AUDIT_JOB, AggregationType, DAILY_JOB, Granularity, HOURLY_JOB, MINUTELY_JOB, MONTHLY_JOB,
};
pub use payload::{AggregationJobPayload, AuditJobPayload};
pub use stats::{LogEvent, StatsRow};
