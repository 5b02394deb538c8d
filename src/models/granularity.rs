// Aggregation types (wire ordinals) and the schedulable granularities with their constants.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Job name for minute partitions.
pub const MINUTELY_JOB: &str = "rollup_minutely_job";
/// Job name for hour partitions.
pub const HOURLY_JOB: &str = "rollup_hourly_job";
/// Job name for day partitions.
pub const DAILY_JOB: &str = "rollup_daily_job";
/// Job name for month partitions.
pub const MONTHLY_JOB: &str = "rollup_monthly_job";
/// Job name for audit (backfill) passes.
pub const AUDIT_JOB: &str = "rollup_audit_job";

/// Aggregation type as carried in job payloads. Serialized as its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AggregationType {
    RealTime,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Minutely,
}

impl From<AggregationType> for u8 {
    fn from(t: AggregationType) -> u8 {
        match t {
            AggregationType::RealTime => 0,
            AggregationType::Hourly => 1,
            AggregationType::Daily => 2,
            AggregationType::Weekly => 3,
            AggregationType::Monthly => 4,
            AggregationType::Minutely => 5,
        }
    }
}

impl TryFrom<u8> for AggregationType {
    type Error = JobError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(AggregationType::RealTime),
            1 => Ok(AggregationType::Hourly),
            2 => Ok(AggregationType::Daily),
            3 => Ok(AggregationType::Weekly),
            4 => Ok(AggregationType::Monthly),
            5 => Ok(AggregationType::Minutely),
            other => Err(JobError::UnknownAggregationType(other)),
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregationType::RealTime => "RealTime",
            AggregationType::Hourly => "Hourly",
            AggregationType::Daily => "Daily",
            AggregationType::Weekly => "Weekly",
            AggregationType::Monthly => "Monthly",
            AggregationType::Minutely => "Minutely",
        };
        f.write_str(s)
    }
}

/// Partition size. Only these four are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
    ];

    /// Queue job name driving this granularity's chain.
    pub fn job_name(self) -> &'static str {
        match self {
            Granularity::Minute => MINUTELY_JOB,
            Granularity::Hour => HOURLY_JOB,
            Granularity::Day => DAILY_JOB,
            Granularity::Month => MONTHLY_JOB,
        }
    }

    /// Task name, also the name of the rollup this granularity produces.
    pub fn task_name(self) -> &'static str {
        match self {
            Granularity::Minute => "rollup_minutely_stats",
            Granularity::Hour => "rollup_hourly_stats",
            Granularity::Day => "rollup_daily_stats",
            Granularity::Month => "rollup_monthly_stats",
        }
    }

    /// Delay used when the chain has fallen behind and the next window is already closed.
    pub fn catch_up_delay(self) -> Duration {
        match self {
            Granularity::Minute => Duration::from_secs(20),
            Granularity::Hour | Granularity::Day | Granularity::Month => Duration::from_secs(60),
        }
    }

    pub fn from_job_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.job_name() == name)
    }

    pub fn aggregation_type(self) -> AggregationType {
        match self {
            Granularity::Minute => AggregationType::Minutely,
            Granularity::Hour => AggregationType::Hourly,
            Granularity::Day => AggregationType::Daily,
            Granularity::Month => AggregationType::Monthly,
        }
    }
}

impl TryFrom<AggregationType> for Granularity {
    type Error = JobError;

    fn try_from(t: AggregationType) -> Result<Self, Self::Error> {
        match t {
            AggregationType::Minutely => Ok(Granularity::Minute),
            AggregationType::Hourly => Ok(Granularity::Hour),
            AggregationType::Daily => Ok(Granularity::Day),
            AggregationType::Monthly => Ok(Granularity::Month),
            AggregationType::RealTime | AggregationType::Weekly => {
                Err(JobError::UnsupportedGranularity(t))
            }
        }
    }
}

impl From<Granularity> for AggregationType {
    fn from(g: Granularity) -> Self {
        g.aggregation_type()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.aggregation_type(), f)
    }
}

/// Case-insensitive; accepts both "hourly" and "hour" forms.
impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minutely" | "minute" => Ok(Granularity::Minute),
            "hourly" | "hour" => Ok(Granularity::Hour),
            "daily" | "day" => Ok(Granularity::Day),
            "monthly" | "month" => Ok(Granularity::Month),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}
