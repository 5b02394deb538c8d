// Command line: `serve` (default) runs the scheduler, `audit` backfills one range and exits.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::error::UsageError;
use crate::models::Granularity;

#[derive(Debug, Parser)]
#[command(name = "rollupd")]
#[command(author, version, about = "Calendar-partitioned event rollup scheduler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the job worker, the orchestrator and the status server.
    Serve,
    /// Aggregate the partition containing `--from` if it has no rows yet.
    Audit(AuditArgs),
}

/// Flags are optional at the parser level; `validate` reports what is missing.
#[derive(Debug, Clone, Default, Args)]
pub struct AuditArgs {
    /// Range start (RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`, UTC).
    #[arg(long, value_name = "DATETIME")]
    pub from: Option<String>,

    /// Range end, same formats as `--from`.
    #[arg(long, value_name = "DATETIME")]
    pub to: Option<String>,

    /// Granularity: minutely, hourly, daily or monthly.
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub kind: Option<String>,

    /// Debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// A validated audit invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRequest {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub granularity: Granularity,
}

impl AuditArgs {
    pub fn validate(&self) -> Result<AuditRequest, UsageError> {
        let from = self.from.as_deref().ok_or(UsageError::Missing("from"))?;
        let to = self.to.as_deref().ok_or(UsageError::Missing("to"))?;
        let kind = self.kind.as_deref().ok_or(UsageError::Missing("type"))?;

        let from = parse_datetime(from).ok_or_else(|| UsageError::InvalidDate {
            flag: "from",
            value: from.to_string(),
        })?;
        let to = parse_datetime(to).ok_or_else(|| UsageError::InvalidDate {
            flag: "to",
            value: to.to_string(),
        })?;
        let granularity = kind
            .parse::<Granularity>()
            .map_err(|_| UsageError::InvalidType(kind.to_string()))?;

        Ok(AuditRequest {
            from,
            to,
            granularity,
        })
    }
}

/// Parses a UTC datetime. Inputs without an offset are taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

pub fn audit_usage() -> &'static str {
    "usage: rollupd audit --from <DATETIME> --to <DATETIME> --type <minutely|hourly|daily|monthly> [--verbose]"
}
