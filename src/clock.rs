/// Clock abstraction and date-key policy
use crate::config::DayBoundary;
use chrono::{Local, NaiveDate, Utc};

/// Format used for keys in the persisted `usage` map
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Source of "today" for bucketing ticks
pub trait Clock {
    fn today(&self) -> NaiveDate;

    fn today_key(&self) -> String {
        date_key(self.today())
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_KEY_FORMAT).ok()
}

/// Wall clock of the host, bucketed by the configured day boundary
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub boundary: DayBoundary,
}

impl SystemClock {
    pub fn new(boundary: DayBoundary) -> Self {
        SystemClock { boundary }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.boundary {
            DayBoundary::Local => Local::now().date_naive(),
            DayBoundary::Utc => Utc::now().date_naive(),
        }
    }
}

/// A clock whose day only changes when told to
#[cfg(test)]
pub struct FixedClock(pub std::cell::Cell<NaiveDate>);

#[cfg(test)]
impl FixedClock {
    pub fn new(key: &str) -> Self {
        FixedClock(std::cell::Cell::new(parse_date_key(key).unwrap()))
    }

    pub fn set(&self, key: &str) {
        self.0.set(parse_date_key(key).unwrap());
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0.get()
    }
}
