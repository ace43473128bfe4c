/// Data structures for X Screen Time
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Browser tab identifier as reported by the host
pub type TabId = i32;

/// Accumulated seconds per date-key (`YYYY-MM-DD`)
///
/// Keys sort chronologically, so iteration order is oldest first.
pub type DailyUsage = BTreeMap<String, u64>;

/// Information about a browser tab
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "windowId", default)]
    pub window_id: i32,
}

#[cfg(test)]
impl TabInfo {
    pub fn new(id: TabId, url: String, window_id: i32) -> TabInfo {
        TabInfo { id, url, window_id }
    }
}

/// Messages sent between the background worker, the overlay and the pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Any context asks the background for today's figures
    GetUsage,
    /// Background pushes today's seconds to the tracked tab
    UpdateTimer { usage: u64 },
}

/// Response to [`Message::GetUsage`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub daily_limit_seconds: u64,
    pub usage: u64,
}
