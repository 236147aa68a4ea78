//! # Statistics
//!
//! Dashboard numbers are computed in two steps: aggregate SQL in [`queries`] returns
//! raw counts, and the functions here turn those counts into response shapes.
//! Everything in this module is pure so the bucketing and percentage rules can be
//! tested without a database.
//!
//! * Completion rate is `round(100 * completed / total)`, and `0` for an empty set.
//! * Priority and time-series buckets are pre-seeded with zero, so empty buckets
//!   still show up in charts.

pub mod queries;

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::TaskPriority;

/// Percentage of `completed` over `total`, rounded half away from zero.
pub fn completion_rate(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i64
}

/// Completed/pending split of a set of tasks or todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    pub completion_rate: i64,
}

impl CompletionSummary {
    pub fn new(total: i64, completed: i64) -> Self {
        Self {
            total,
            completed,
            pending: total - completed,
            completion_rate: completion_rate(completed, total),
        }
    }
}

/// Status buckets: completed, pending and the overdue subset of pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    /// Not completed, with a due date in the past.
    pub overdue: i64,
    pub completion_rate: i64,
}

impl StatusBreakdown {
    pub fn new(total: i64, completed: i64, overdue: i64) -> Self {
        let summary = CompletionSummary::new(total, completed);
        Self {
            total,
            completed,
            pending: summary.pending,
            overdue,
            completion_rate: summary.completion_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityBucket {
    pub priority: i16,
    pub label: String,
    pub count: i64,
}

/// One bucket per priority level, ascending, with zero for missing levels.
///
/// Rows with an out-of-range level are folded into the nearest valid one.
pub fn priority_buckets(rows: &[(i16, i64)]) -> Vec<PriorityBucket> {
    let mut counts: HashMap<i16, i64> = HashMap::new();
    for &(priority, count) in rows {
        let level = TaskPriority::from_level(priority.into()).level();
        *counts.entry(level).or_insert(0) += count;
    }
    TaskPriority::ALL
        .iter()
        .map(|p| PriorityBucket {
            priority: p.level(),
            label: p.label().to_string(),
            count: counts.get(&p.level()).copied().unwrap_or(0),
        })
        .collect()
}

/// Bucket width of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
}

impl Granularity {
    /// Unit understood by Postgres `date_trunc`.
    pub fn sql_unit(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }
}

/// Chart window selector for "tasks by date".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Last 7 days, one bucket per day.
    #[default]
    Week,
    /// Last 30 days, one bucket per day.
    Month,
    /// Last 12 months including the current one, one bucket per month.
    Year,
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            _ => Err(AppError::invalid_field(
                "period",
                "invalid_period",
                "Period must be one of: week, month, year",
            )),
        }
    }
}

impl Period {
    /// Parses an optional query value; absent means `week`.
    pub fn parse_param(raw: Option<&str>) -> Result<Self, AppError> {
        raw.map_or(Ok(Period::default()), str::parse)
    }

    pub fn bucket_count(self) -> usize {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 12,
        }
    }

    pub fn granularity(self) -> Granularity {
        match self {
            Period::Week | Period::Month => Granularity::Day,
            Period::Year => Granularity::Month,
        }
    }

    /// Bucket keys in ascending order, ending with the bucket containing `today`.
    /// Monthly keys are the first day of the month.
    pub fn bucket_keys(self, today: NaiveDate) -> Vec<NaiveDate> {
        let count = self.bucket_count();
        match self.granularity() {
            Granularity::Day => (0..count)
                .rev()
                .map(|back| today - Duration::days(back as i64))
                .collect(),
            Granularity::Month => (0..count)
                .rev()
                .filter_map(|back| months_before(today, back as i32))
                .collect(),
        }
    }

    /// First instant covered by the window.
    pub fn start(self, today: NaiveDate) -> NaiveDate {
        self.bucket_keys(today).first().copied().unwrap_or(today)
    }

    pub fn label(self, key: NaiveDate) -> String {
        let format = match self {
            Period::Week => "%a",
            Period::Month => "%d %b",
            Period::Year => "%b",
        };
        key.format(format).to_string()
    }
}

/// First day of the month `back` months before the month of `date`.
fn months_before(date: NaiveDate, back: i32) -> Option<NaiveDate> {
    let index = date.year() * 12 + date.month0() as i32 - back;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub date: NaiveDate,
    pub label: String,
    pub count: i64,
}

/// Zero-filled series for `period` ending at `today`, overlaid with `counts`.
///
/// `counts` holds `(bucket key, count)` pairs as produced by `date_trunc`; keys
/// outside the window are ignored.
pub fn time_series(period: Period, today: NaiveDate, counts: &[(NaiveDate, i64)]) -> Vec<TimeBucket> {
    let mut buckets: Vec<TimeBucket> = period
        .bucket_keys(today)
        .into_iter()
        .map(|date| TimeBucket {
            date,
            label: period.label(date),
            count: 0,
        })
        .collect();

    for &(key, count) in counts {
        if let Some(bucket) = buckets.iter_mut().find(|b| b.date == key) {
            bucket.count += count.max(0);
        }
    }
    buckets
}

/// A time series together with the period that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksByDate {
    pub period: Period,
    pub buckets: Vec<TimeBucket>,
    pub total: i64,
}

impl TasksByDate {
    pub fn new(period: Period, buckets: Vec<TimeBucket>) -> Self {
        let total = buckets.iter().map(|b| b.count).sum();
        Self {
            period,
            buckets,
            total,
        }
    }
}

/// Task counters attached to a tag or a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub tasks_count: i64,
    pub completed_count: i64,
    pub incomplete_count: i64,
    pub completion_rate: i64,
}

impl GroupStats {
    pub fn new(tasks_count: i64, completed_count: i64) -> Self {
        Self {
            tasks_count,
            completed_count,
            incomplete_count: tasks_count - completed_count,
            completion_rate: completion_rate(completed_count, tasks_count),
        }
    }
}

/// Default and bounds of the "most active users" ranking size.
pub const DEFAULT_TOP_USERS: i64 = 5;
pub const MAX_TOP_USERS: i64 = 50;

pub fn top_users_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_TOP_USERS)
        .clamp(1, MAX_TOP_USERS)
}
