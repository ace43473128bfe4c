/// Display arithmetic shared by the overlay, popup and history page
use crate::clock::parse_date_key;
use crate::usage_data::DailyUsage;
use chrono::{Datelike, NaiveDate};

const WEEKDAYS: [&str; 7] = ["日", "月", "火", "水", "木", "金", "土"];

/// `M:SS` with unpadded minutes
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Whole minutes, floored: `N分`
pub fn format_minutes(seconds: u64) -> String {
    format!("{}分", seconds / 60)
}

/// `H時間M分` from one hour up, otherwise `M分`
pub fn format_hours_minutes(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;

    if hours > 0 {
        format!("{}時間{}分", hours, mins)
    } else {
        format!("{}分", mins)
    }
}

pub fn remaining_seconds(limit_seconds: u64, used_seconds: u64) -> u64 {
    limit_seconds.saturating_sub(used_seconds)
}

/// What the in-page timer shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStatus {
    pub remaining: u64,
    pub time_up: bool,
}

impl TimerStatus {
    pub fn new(limit_seconds: u64, used_seconds: u64) -> Self {
        let remaining = remaining_seconds(limit_seconds, used_seconds);
        TimerStatus {
            remaining,
            time_up: remaining == 0,
        }
    }

    pub fn label(&self) -> String {
        format!("残り時間: {}", format_time(self.remaining))
    }
}

/// `2024年1月2日`
pub fn format_full_date(date: NaiveDate) -> String {
    format!("{}年{}月{}日", date.year(), date.month(), date.day())
}

/// `1月2日`
pub fn format_short_date(date: NaiveDate) -> String {
    format!("{}月{}日", date.month(), date.day())
}

pub fn weekday_label(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_sunday() as usize]
}

/// Summary figures for the history page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub total_days: usize,
    pub total_seconds: u64,
    /// Floored
    pub average_seconds: u64,
}

impl HistoryStats {
    pub fn from_usage(usage: &DailyUsage) -> Self {
        let total_days = usage.len();
        if total_days == 0 {
            return HistoryStats::default();
        }

        let total_seconds: u64 = usage.values().sum();
        HistoryStats {
            total_days,
            total_seconds,
            average_seconds: total_seconds / total_days as u64,
        }
    }

    pub fn days_label(&self) -> String {
        format!("{}日", self.total_days)
    }

    pub fn average_label(&self) -> String {
        format_minutes(self.average_seconds)
    }

    pub fn total_label(&self) -> String {
        format_hours_minutes(self.total_seconds)
    }
}

/// One line of the full history list
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub date_key: String,
    pub date_label: String,
    pub weekday: Option<&'static str>,
    pub minutes: u64,
    /// Bar length relative to max(largest day, daily limit)
    pub bar_percent: f64,
    pub over_limit: bool,
}

/// All recorded days, newest first
pub fn history_rows(usage: &DailyUsage, limit_seconds: u64) -> Vec<HistoryRow> {
    let scale = usage
        .values()
        .copied()
        .max()
        .unwrap_or(0)
        .max(limit_seconds);

    usage
        .iter()
        .rev()
        .map(|(key, &seconds)| {
            let date = parse_date_key(key);
            HistoryRow {
                date_key: key.clone(),
                date_label: date.map(format_full_date).unwrap_or_else(|| key.clone()),
                weekday: date.map(weekday_label),
                minutes: seconds / 60,
                bar_percent: if scale == 0 {
                    0.0
                } else {
                    seconds as f64 / scale as f64 * 100.0
                },
                over_limit: seconds > limit_seconds,
            }
        })
        .collect()
}

/// Compact entry in the popup's recent list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentDay {
    pub date_label: String,
    pub minutes_label: String,
}

/// The `count` most recent days, newest first
pub fn recent_days(usage: &DailyUsage, count: usize) -> Vec<RecentDay> {
    usage
        .iter()
        .rev()
        .take(count)
        .map(|(key, &seconds)| RecentDay {
            date_label: parse_date_key(key)
                .map(format_short_date)
                .unwrap_or_else(|| key.clone()),
            minutes_label: format_minutes(seconds),
        })
        .collect()
}
