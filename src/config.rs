/// Tracker configuration and daily-limit validation
use crate::error::LimitError;
use crate::site::TRACKED_HOSTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LIMIT_MINUTES: u32 = 60;
pub const MIN_LIMIT_MINUTES: u32 = 1;
pub const MAX_LIMIT_MINUTES: u32 = 1440;

/// Which calendar day a tick is booked against
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    /// The browser's local midnight
    #[default]
    Local,
    Utc,
}

/// Static settings shared by the background worker and the views
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    pub tracked_hosts: Vec<String>,
    pub tick_ms: u32,
    pub overlay_poll_ms: u32,
    pub popup_poll_ms: u32,
    pub default_limit_minutes: u32,
    pub recent_days: usize,
    pub day_boundary: DayBoundary,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            tracked_hosts: TRACKED_HOSTS.iter().map(|h| h.to_string()).collect(),
            tick_ms: 1000,
            overlay_poll_ms: 5000,
            popup_poll_ms: 1000,
            default_limit_minutes: DEFAULT_LIMIT_MINUTES,
            recent_days: 7,
            day_boundary: DayBoundary::Local,
        }
    }
}

/// A daily limit in minutes, guaranteed to be within [1, 1440]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyLimit(u32);

impl DailyLimit {
    pub fn new(minutes: u32) -> Result<Self, LimitError> {
        if (MIN_LIMIT_MINUTES..=MAX_LIMIT_MINUTES).contains(&minutes) {
            Ok(DailyLimit(minutes))
        } else {
            Err(LimitError::OutOfRange(i64::from(minutes)))
        }
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn seconds(self) -> u64 {
        u64::from(self.0) * 60
    }
}

impl Default for DailyLimit {
    fn default() -> Self {
        DailyLimit(DEFAULT_LIMIT_MINUTES)
    }
}

impl fmt::Display for DailyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DailyLimit {
    type Err = LimitError;

    /// Parses user input from the popup's limit field
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let minutes: i64 = trimmed
            .parse()
            .map_err(|_| LimitError::NotANumber(trimmed.to_string()))?;

        match u32::try_from(minutes) {
            Ok(m) => DailyLimit::new(m),
            Err(_) => Err(LimitError::OutOfRange(minutes)),
        }
    }
}
