/// Browser-side implementations of the storage, tab and timer traits
use crate::counter::{IntervalTimer, TabMessenger};
use crate::error::{DeliveryError, HostError, StorageError};
use crate::monitor::BrowserTabs;
use crate::storage::{HostStorageChanges, KeyValueStore};
use crate::usage_data::{Message, TabId, TabInfo, UsageResponse};
use serde::Serialize;
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/bridge/storage.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> Result<(), JsValue>;

    fn onStorageChanged(callback: &js_sys::Function) -> js_sys::Function;
}

#[wasm_bindgen(module = "/bridge/tabs.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn queryActiveTab() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getFocusedWindow() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getTab(tab_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendToTab(tab_id: i32, message: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn openExtensionPage(path: &str) -> Result<(), JsValue>;

    fn addBrowserListeners(
        on_activated: &js_sys::Function,
        on_updated: &js_sys::Function,
        on_focus_changed: &js_sys::Function,
        on_removed: &js_sys::Function,
        on_installed: &js_sys::Function,
    );
}

#[wasm_bindgen(module = "/bridge/runtime.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn sendRuntimeMessage(message: JsValue) -> Result<JsValue, JsValue>;

    fn onRuntimeMessage(handler: &js_sys::Function);
}

#[wasm_bindgen(module = "/bridge/timers.js")]
extern "C" {
    fn startInterval(callback: &js_sys::Function, ms: u32) -> JsValue;

    fn stopInterval(id: &JsValue);

    fn startTimeout(callback: &js_sys::Function, ms: u32) -> JsValue;

    fn stopTimeout(id: &JsValue);
}

/// Plain-object serialisation (no JS `Map`s) so chrome APIs accept the value
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

/// `chrome.storage.local`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStorage;

impl KeyValueStore for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let value = getStorage(key)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to get storage: {:?}", e)))?;

        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }

        serde_wasm_bindgen::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Malformed {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let value = to_js(&value).map_err(|reason| StorageError::Malformed {
            key: key.to_string(),
            reason,
        })?;

        setStorage(key, value)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to save storage: {:?}", e)))
    }
}

/// A `chrome.storage.onChanged` listener, removed on drop
pub struct StorageListener {
    remove: js_sys::Function,
    _callback: Closure<dyn Fn(JsValue)>,
}

impl Drop for StorageListener {
    fn drop(&mut self) {
        if let Err(e) = self.remove.call0(&JsValue::NULL) {
            log::warn!("Failed to remove storage listener: {:?}", e);
        }
    }
}

/// Subscribe to `chrome.storage.onChanged` for the local area until the guard is dropped
pub fn listen_storage_changes(callback: impl Fn(HostStorageChanges) + 'static) -> StorageListener {
    let closure = Closure::<dyn Fn(JsValue)>::new(move |changes: JsValue| {
        match serde_wasm_bindgen::from_value::<HostStorageChanges>(changes) {
            Ok(changes) => callback(changes),
            Err(e) => log::warn!("Unreadable storage change: {:?}", e),
        }
    });
    let remove = onStorageChanged(closure.as_ref().unchecked_ref());
    StorageListener {
        remove,
        _callback: closure,
    }
}

/// `chrome.tabs`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeTabs;

fn parse_tab(value: JsValue) -> Result<TabInfo, HostError> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|e| HostError(format!("Failed to parse tab: {:?}", e)))
}

impl TabMessenger for ChromeTabs {
    async fn send_to_tab(&self, tab_id: TabId, message: &Message) -> Result<(), DeliveryError> {
        let message = to_js(message).map_err(|reason| DeliveryError { tab_id, reason })?;

        sendToTab(tab_id, message).await.map_err(|e| DeliveryError {
            tab_id,
            reason: format!("{:?}", e),
        })
    }
}

impl BrowserTabs for ChromeTabs {
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
        let tab = queryActiveTab()
            .await
            .map_err(|e| HostError(format!("Failed to query tabs: {:?}", e)))?;

        if tab.is_null() || tab.is_undefined() {
            return Ok(None);
        }
        parse_tab(tab).map(Some)
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        let tab = getTab(tab_id)
            .await
            .map_err(|e| HostError(format!("Failed to get tab {}: {:?}", tab_id, e)))?;
        parse_tab(tab)
    }

    async fn focused_window(&self) -> Result<Option<i32>, HostError> {
        let window = getFocusedWindow()
            .await
            .map_err(|e| HostError(format!("Failed to query windows: {:?}", e)))?;
        Ok(window.as_f64().map(|id| id as i32))
    }
}

/// Callbacks for the host events the background worker consumes
pub struct BrowserEvents {
    pub on_activated: Box<dyn Fn(TabId)>,
    pub on_updated: Box<dyn Fn(TabId, Option<String>)>,
    pub on_focus_changed: Box<dyn Fn(i32)>,
    pub on_removed: Box<dyn Fn(TabId)>,
    pub on_installed: Box<dyn Fn()>,
}

/// Register `events` with the browser for the worker's lifetime
pub fn listen_browser_events(events: BrowserEvents) {
    let on_activated = Closure::wrap(events.on_activated);
    let on_updated = Closure::wrap(events.on_updated);
    let on_focus_changed = Closure::wrap(events.on_focus_changed);
    let on_removed = Closure::wrap(events.on_removed);
    let on_installed = Closure::wrap(events.on_installed);

    addBrowserListeners(
        on_activated.as_ref().unchecked_ref(),
        on_updated.as_ref().unchecked_ref(),
        on_focus_changed.as_ref().unchecked_ref(),
        on_removed.as_ref().unchecked_ref(),
        on_installed.as_ref().unchecked_ref(),
    );

    on_activated.forget();
    on_updated.forget();
    on_focus_changed.forget();
    on_removed.forget();
    on_installed.forget();
}

pub async fn open_extension_page(path: &str) -> Result<(), String> {
    openExtensionPage(path)
        .await
        .map_err(|e| format!("Failed to open {}: {:?}", path, e))
}

/// Ask the background worker for today's usage and limit
pub async fn request_usage() -> Result<UsageResponse, String> {
    let message = to_js(&Message::GetUsage)?;
    let response = sendRuntimeMessage(message)
        .await
        .map_err(|e| format!("Failed to fetch usage: {:?}", e))?;

    serde_wasm_bindgen::from_value(response)
        .map_err(|e| format!("Failed to parse usage: {:?}", e))
}

/// Receive runtime messages; return a promise to answer asynchronously
pub fn listen_runtime_messages(handler: impl Fn(Message) -> Option<js_sys::Promise> + 'static) {
    let closure = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |raw: JsValue| {
        match serde_wasm_bindgen::from_value::<Message>(raw) {
            Ok(message) => handler(message).map(JsValue::from).unwrap_or(JsValue::UNDEFINED),
            // Messages meant for other listeners
            Err(_) => JsValue::UNDEFINED,
        }
    });
    onRuntimeMessage(closure.as_ref().unchecked_ref());
    closure.forget();
}

/// A repeating host timer, cleared on drop
pub struct Interval {
    id: JsValue,
    _callback: Closure<dyn FnMut()>,
}

impl Interval {
    pub fn new(ms: u32, callback: impl FnMut() + 'static) -> Self {
        let callback = Closure::<dyn FnMut()>::new(callback);
        let id = startInterval(callback.as_ref().unchecked_ref(), ms);
        Interval {
            id,
            _callback: callback,
        }
    }
}

impl Drop for Interval {
    fn drop(&mut self) {
        stopInterval(&self.id);
    }
}

/// A one-shot host timer, cleared on drop if it has not fired
pub struct Timeout {
    id: JsValue,
    _callback: Closure<dyn FnMut()>,
}

impl Timeout {
    pub fn new(ms: u32, callback: impl FnOnce() + 'static) -> Self {
        let mut callback = Some(callback);
        let callback = Closure::<dyn FnMut()>::new(move || {
            if let Some(f) = callback.take() {
                f();
            }
        });
        let id = startTimeout(callback.as_ref().unchecked_ref(), ms);
        Timeout {
            id,
            _callback: callback,
        }
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        stopTimeout(&self.id);
    }
}

/// Drives the counter's tick through `setInterval`
pub struct JsIntervalTimer {
    on_tick: Rc<dyn Fn(TabId)>,
}

impl JsIntervalTimer {
    pub fn new(on_tick: impl Fn(TabId) + 'static) -> Self {
        JsIntervalTimer {
            on_tick: Rc::new(on_tick),
        }
    }
}

impl IntervalTimer for JsIntervalTimer {
    type Handle = Interval;

    fn start(&mut self, tab_id: TabId, period_ms: u32) -> Interval {
        let on_tick = Rc::clone(&self.on_tick);
        Interval::new(period_ms, move || on_tick(tab_id))
    }

    fn cancel(&mut self, handle: Interval) {
        drop(handle);
    }
}
