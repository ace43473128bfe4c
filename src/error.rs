/// Error types for X Screen Time
use crate::usage_data::TabId;
use thiserror::Error;

/// Reading or writing persisted state failed
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error("malformed value for key `{key}`: {reason}")]
    Malformed { key: String, reason: String },
}

/// A push to a tab could not be delivered
#[derive(Debug, Error)]
#[error("could not deliver message to tab {tab_id}: {reason}")]
pub struct DeliveryError {
    pub tab_id: TabId,
    pub reason: String,
}

/// A tab or window query failed
#[derive(Debug, Error)]
#[error("tab query failed: {0}")]
pub struct HostError(pub String);

/// User input for the daily limit was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("not a number: {0:?}")]
    NotANumber(String),

    #[error("limit {0} outside 1..=1440 minutes")]
    OutOfRange(i64),
}

impl LimitError {
    /// Message shown next to the limit field
    pub fn user_message(&self) -> &'static str {
        "1〜1440分の範囲で入力してください"
    }
}

/// Anything the background worker can fail with while handling an event
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Host(#[from] HostError),
}
