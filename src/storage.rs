/// Persisted usage state and change notifications
///
/// Two keys live in the extension's local storage area:
/// - `usage`: `{ "YYYY-MM-DD": seconds, ... }`
/// - `dailyLimit`: minutes in [1, 1440]
use crate::config::DailyLimit;
use crate::error::StorageError;
use crate::usage_data::DailyUsage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub const USAGE_KEY: &str = "usage";
pub const DAILY_LIMIT_KEY: &str = "dailyLimit";

/// Async key-value backend (chrome.storage.local in the browser)
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// In-process backend for unit tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<std::collections::HashMap<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

/// A mutation of one of the persisted keys
#[derive(Debug, Clone, PartialEq)]
pub enum StorageChange {
    Usage(DailyUsage),
    /// `None` when the key was removed
    DailyLimit(Option<u32>),
}

/// Handle returned by [`ChangeBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

type Listener = Rc<dyn Fn(&StorageChange)>;

/// Observer list for storage mutations
#[derive(Default)]
pub struct ChangeBus {
    next_id: Cell<usize>,
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&StorageChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let original_len = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() < original_len
    }

    pub fn publish(&self, change: &StorageChange) {
        // Listeners may subscribe or unsubscribe while being notified
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();

        for listener in listeners {
            listener(change);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Both persisted keys, read together by the views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageData {
    pub usage: DailyUsage,
    pub daily_limit: DailyLimit,
}

impl StorageData {
    pub fn usage_on(&self, date_key: &str) -> u64 {
        self.usage.get(date_key).copied().unwrap_or(0)
    }

    /// Fold a change notification into this snapshot
    pub fn apply(&mut self, change: &StorageChange) {
        match change {
            StorageChange::Usage(usage) => self.usage = usage.clone(),
            StorageChange::DailyLimit(minutes) => {
                self.daily_limit = limit_or_default(*minutes);
            }
        }
    }
}

/// Typed access to the persisted keys plus the change bus
pub struct UsageStore<S> {
    backend: S,
    changes: ChangeBus,
}

impl<S: KeyValueStore> UsageStore<S> {
    pub fn new(backend: S) -> Self {
        UsageStore {
            backend,
            changes: ChangeBus::new(),
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn changes(&self) -> &ChangeBus {
        &self.changes
    }

    pub async fn get_all_usage(&self) -> Result<DailyUsage, StorageError> {
        Ok(self.read::<DailyUsage>(USAGE_KEY).await?.unwrap_or_default())
    }

    /// Seconds recorded for `date_key`, 0 when absent
    pub async fn get_usage(&self, date_key: &str) -> Result<u64, StorageError> {
        let usage = self.get_all_usage().await?;
        Ok(usage.get(date_key).copied().unwrap_or(0))
    }

    /// Add one second to `date_key` and persist the whole map
    ///
    /// Read-modify-write; only the background counter calls this.
    pub async fn increment(&self, date_key: &str) -> Result<u64, StorageError> {
        let mut usage = self.get_all_usage().await?;
        let entry = usage.entry(date_key.to_string()).or_insert(0);
        *entry += 1;
        let new_seconds = *entry;

        self.write(USAGE_KEY, &usage).await?;
        self.changes.publish(&StorageChange::Usage(usage));

        Ok(new_seconds)
    }

    /// Configured limit, falling back to 60 minutes when unset or invalid
    pub async fn get_limit(&self) -> Result<DailyLimit, StorageError> {
        let stored = self.read_raw_limit().await?;
        Ok(limit_or_default(stored))
    }

    pub async fn set_limit(&self, limit: DailyLimit) -> Result<(), StorageError> {
        self.write(DAILY_LIMIT_KEY, &limit.minutes()).await?;
        self.changes
            .publish(&StorageChange::DailyLimit(Some(limit.minutes())));
        Ok(())
    }

    /// Write `default` if no usable limit is stored; returns true if it wrote
    pub async fn ensure_limit(&self, default: DailyLimit) -> Result<bool, StorageError> {
        let stored = self.read_raw_limit().await?;
        if stored.is_some_and(|m| DailyLimit::new(m).is_ok()) {
            return Ok(false);
        }

        self.set_limit(default).await?;
        Ok(true)
    }

    pub async fn snapshot(&self) -> Result<StorageData, StorageError> {
        Ok(StorageData {
            usage: self.get_all_usage().await?,
            daily_limit: self.get_limit().await?,
        })
    }

    /// Forward changes made by another context to local subscribers
    pub fn publish_external(&self, changes: HostStorageChanges) {
        for change in changes.into_changes() {
            self.changes.publish(&change);
        }
    }

    async fn read_raw_limit(&self) -> Result<Option<u32>, StorageError> {
        // JS numbers may come back as floats
        match self.backend.get(DAILY_LIMIT_KEY).await? {
            Some(value) => Ok(value
                .as_u64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|m| m.fract() == 0.0 && *m >= 0.0)
                        .map(|m| m as u64)
                })
                .and_then(|m| u32::try_from(m).ok())),
            None => Ok(None),
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Malformed {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.backend.set(key, value).await
    }
}

fn limit_or_default(minutes: Option<u32>) -> DailyLimit {
    minutes
        .and_then(|m| DailyLimit::new(m).ok())
        .unwrap_or_default()
}

/// `{ newValue }` half of a host change record
#[derive(Debug, Clone, Deserialize)]
pub struct ValueChange<T> {
    #[serde(rename = "newValue")]
    pub new_value: Option<T>,
}

/// Shape of the object passed to `chrome.storage.onChanged` listeners
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostStorageChanges {
    pub usage: Option<ValueChange<DailyUsage>>,
    #[serde(rename = "dailyLimit")]
    pub daily_limit: Option<ValueChange<u32>>,
}

impl HostStorageChanges {
    pub fn into_changes(self) -> Vec<StorageChange> {
        let mut changes = Vec::new();
        if let Some(change) = self.usage {
            changes.push(StorageChange::Usage(change.new_value.unwrap_or_default()));
        }
        if let Some(change) = self.daily_limit {
            changes.push(StorageChange::DailyLimit(change.new_value));
        }
        changes
    }
}
