/// Background service worker: wires host events to the tracker
use crate::chrome::{
    BrowserEvents, ChromeStorage, ChromeTabs, JsIntervalTimer, listen_browser_events,
    listen_runtime_messages,
};
use crate::clock::SystemClock;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::monitor::{Decision, Tracker};
use crate::storage::UsageStore;
use crate::usage_data::{Message, TabId};
use std::future::Future;
use std::rc::{Rc, Weak};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

pub type BackgroundTracker = Tracker<ChromeStorage, ChromeTabs, JsIntervalTimer>;

pub fn run(config: TrackerConfig) {
    let tracker = Rc::new_cyclic(|weak: &Weak<BackgroundTracker>| {
        let weak = weak.clone();
        let timer = JsIntervalTimer::new(move |tab_id| {
            let Some(tracker) = weak.upgrade() else {
                return;
            };
            spawn_local(async move {
                if let Err(e) = tracker.tick(tab_id).await {
                    log::warn!("Tick failed: {}", e);
                }
            });
        });

        let clock = SystemClock::new(config.day_boundary);
        Tracker::new(
            config,
            UsageStore::new(ChromeStorage),
            ChromeTabs,
            Box::new(clock),
            timer,
        )
    });

    listen_browser_events(BrowserEvents {
        on_activated: {
            let tracker = Rc::clone(&tracker);
            Box::new(move |tab_id: TabId| {
                let tracker = Rc::clone(&tracker);
                handle("tab activated", async move { tracker.on_tab_activated(tab_id).await });
            })
        },
        on_updated: {
            let tracker = Rc::clone(&tracker);
            Box::new(move |tab_id: TabId, url: Option<String>| {
                let tracker = Rc::clone(&tracker);
                handle("tab updated", async move {
                    tracker.on_tab_updated(tab_id, url.as_deref()).await
                });
            })
        },
        on_focus_changed: {
            let tracker = Rc::clone(&tracker);
            Box::new(move |window_id: i32| {
                let tracker = Rc::clone(&tracker);
                handle("focus changed", async move {
                    tracker.on_focus_changed(window_id).await
                });
            })
        },
        on_removed: {
            let tracker = Rc::clone(&tracker);
            Box::new(move |tab_id: TabId| {
                tracker.on_tab_removed(tab_id);
            })
        },
        on_installed: {
            let tracker = Rc::clone(&tracker);
            Box::new(move || {
                let tracker = Rc::clone(&tracker);
                handle("installed", async move { tracker.on_installed().await });
            })
        },
    });

    {
        let tracker = Rc::clone(&tracker);
        listen_runtime_messages(move |message: Message| {
            // Only requests get an asynchronous answer
            if message != Message::GetUsage {
                return None;
            }

            let tracker = Rc::clone(&tracker);
            Some(future_to_promise(async move {
                let response = tracker
                    .handle_message(&message)
                    .await
                    .map_err(|e| JsValue::from_str(&e.to_string()))?;
                serde_wasm_bindgen::to_value(&response)
                    .map_err(|e| JsValue::from_str(&format!("{:?}", e)))
            }))
        });
    }

    // Worker (re)start: nothing is running yet, so look at the current tab
    handle("startup", async move { tracker.reconcile().await });
    log::info!("Background worker started");
}

fn handle(event: &'static str, fut: impl Future<Output = Result<Decision, TrackerError>> + 'static) {
    spawn_local(async move {
        match fut.await {
            Ok(decision) => log::debug!("{}: {:?}", event, decision),
            Err(e) => log::warn!("{} handler failed: {}", event, e),
        }
    });
}
