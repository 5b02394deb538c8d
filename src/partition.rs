// Calendar partitions: one minute/hour/day/month window, boundaries in UTC.
// `end` is inclusive (next boundary minus one second), matching the rollup queries.

use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};

use crate::models::Granularity;

/// One calendar window of a granularity. Immutable; stepping returns a new partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    number: u32,
}

impl Partition {
    /// Snaps `at` down to the window of `granularity` that contains it.
    pub fn new(granularity: Granularity, at: DateTime<Utc>) -> Self {
        let start = floor(granularity, at);
        let end = next_boundary(granularity, start)
            .map(|next| next - TimeDelta::seconds(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let number = match granularity {
            Granularity::Minute => start.minute(),
            Granularity::Hour => start.hour(),
            Granularity::Day => start.day(),
            Granularity::Month => start.month(),
        };
        Self {
            granularity,
            start,
            end,
            number,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Position inside the parent unit: minute 0-59, hour 0-23, day 1-31, month 1-12.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The partition starting right after `end`.
    pub fn increment(&self) -> Partition {
        match self.end.checked_add_signed(TimeDelta::seconds(1)) {
            Some(next) => Partition::new(self.granularity, next),
            None => *self,
        }
    }

    /// The partition ending right before `start`.
    pub fn decrement(&self) -> Partition {
        match self.start.checked_sub_signed(TimeDelta::seconds(1)) {
            Some(prev) => Partition::new(self.granularity, prev),
            None => *self,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Days in the month this partition starts in.
    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.start.year(), self.start.month())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} [{} - {}]",
            self.granularity,
            self.number,
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 31,
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn floor(granularity: Granularity, at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    match granularity {
        Granularity::Minute => {
            midnight(date) + TimeDelta::minutes(i64::from(at.hour() * 60 + at.minute()))
        }
        Granularity::Hour => midnight(date) + TimeDelta::hours(i64::from(at.hour())),
        Granularity::Day => midnight(date),
        Granularity::Month => midnight(date.with_day(1).unwrap_or(date)),
    }
}

/// Start of the following window; None only at the end of the representable range.
fn next_boundary(granularity: Granularity, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match granularity {
        Granularity::Minute => start.checked_add_signed(TimeDelta::minutes(1)),
        Granularity::Hour => start.checked_add_signed(TimeDelta::hours(1)),
        Granularity::Day => start.date_naive().succ_opt().map(midnight),
        Granularity::Month => start
            .date_naive()
            .checked_add_months(Months::new(1))
            .map(midnight),
    }
}
