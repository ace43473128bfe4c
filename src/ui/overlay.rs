/// In-page remaining-time overlay, injected into tracked-site tabs

use crate::chrome::{Interval, listen_runtime_messages, listen_storage_changes, request_usage};
use crate::config::{DailyLimit, TrackerConfig};
use crate::report::TimerStatus;
use crate::storage::StorageChange;
use crate::usage_data::{Message, UsageResponse};
use std::rc::Rc;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

const OVERLAY_ID: &str = "x-screen-time-timer";
const NORMAL_BACKGROUND: &str = "rgba(29, 161, 242, 0.95)";
const TIME_UP_BACKGROUND: &str = "rgba(220, 38, 38, 0.95)";
const TIME_UP_PAGE_BACKGROUND: &str = "#fee2e2";

/// What the overlay knows about today
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayState {
    /// Unknown until the background first answers
    pub limit_seconds: Option<u64>,
    pub usage: u64,
}

pub enum OverlayAction {
    Fetched(UsageResponse),
    /// `UPDATE_TIMER` push from the background
    Pushed(u64),
    LimitChanged(Option<u32>),
}

impl Reducible for OverlayState {
    type Action = OverlayAction;

    fn reduce(self: Rc<Self>, action: Self::Action) -> Rc<Self> {
        let mut next = *self;
        match action {
            OverlayAction::Fetched(response) => {
                next.limit_seconds = Some(response.daily_limit_seconds);
                next.usage = response.usage;
            }
            OverlayAction::Pushed(usage) => next.usage = usage,
            OverlayAction::LimitChanged(minutes) => {
                let limit = minutes
                    .and_then(|m| DailyLimit::new(m).ok())
                    .unwrap_or_default();
                next.limit_seconds = Some(limit.seconds());
            }
        }
        Rc::new(next)
    }
}

impl OverlayState {
    pub fn status(&self) -> Option<TimerStatus> {
        self.limit_seconds
            .map(|limit| TimerStatus::new(limit, self.usage))
    }
}

fn fetch(dispatcher: UseReducerDispatcher<OverlayState>) {
    spawn_local(async move {
        match request_usage().await {
            Ok(response) => dispatcher.dispatch(OverlayAction::Fetched(response)),
            Err(e) => log::error!("{}", e),
        }
    });
}

/// Tint the host page while the limit is exhausted
fn set_page_alert(time_up: bool) {
    let Some(body) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.body())
    else {
        return;
    };

    let color = if time_up { TIME_UP_PAGE_BACKGROUND } else { "" };
    if let Err(e) = body.style().set_property("background-color", color) {
        log::warn!("Failed to set page background: {:?}", e);
    }
}

#[function_component(TimerOverlay)]
pub fn timer_overlay() -> Html {
    let state = use_reducer(OverlayState::default);

    {
        let dispatcher = state.dispatcher();

        use_effect_with((), move |_| {
            let config = TrackerConfig::default();
            fetch(dispatcher.clone());

            {
                let dispatcher = dispatcher.clone();
                listen_runtime_messages(move |message| {
                    if let Message::UpdateTimer { usage } = message {
                        dispatcher.dispatch(OverlayAction::Pushed(usage));
                    }
                    None
                });
            }

            let limit_listener = {
                let dispatcher = dispatcher.clone();
                listen_storage_changes(move |changes| {
                    for change in changes.into_changes() {
                        if let StorageChange::DailyLimit(minutes) = change {
                            dispatcher.dispatch(OverlayAction::LimitChanged(minutes));
                        }
                    }
                })
            };

            // Backstop for missed pushes
            let poll = Interval::new(config.overlay_poll_ms, move || fetch(dispatcher.clone()));
            move || {
                drop(limit_listener);
                drop(poll);
            }
        });
    }

    let status = state.status();

    {
        let time_up = status.is_some_and(|s| s.time_up);
        use_effect_with(time_up, |time_up| {
            set_page_alert(*time_up);
            || ()
        });
    }

    let Some(status) = status else {
        return html! {};
    };

    let background = if status.time_up {
        TIME_UP_BACKGROUND
    } else {
        NORMAL_BACKGROUND
    };

    html! {
        <div
            id={OVERLAY_ID}
            style={format!("position: fixed; bottom: 20px; right: 20px; z-index: 999999; background-color: {}; color: white; padding: 12px 16px; border-radius: 8px; font-size: 14px; font-weight: 600; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1); pointer-events: none; user-select: none;", background)}
        >
            {status.label()}
        </div>
    }
}

/// Append a host element to the page and render the overlay into it
pub fn mount() -> Result<(), String> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| "No document".to_string())?;
    let body = document.body().ok_or_else(|| "No body".to_string())?;

    if document.get_element_by_id(&format!("{}-root", OVERLAY_ID)).is_some() {
        return Ok(());
    }

    let root = document
        .create_element("div")
        .map_err(|e| format!("Failed to create overlay root: {:?}", e))?;
    root.set_id(&format!("{}-root", OVERLAY_ID));
    body.append_child(&root)
        .map_err(|e| format!("Failed to attach overlay root: {:?}", e))?;

    yew::Renderer::<TimerOverlay>::with_root(root).render();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(state: OverlayState, action: OverlayAction) -> OverlayState {
        *Rc::new(state).reduce(action)
    }

    #[test]
    fn test_unknown_limit_renders_nothing() {
        assert_eq!(OverlayState::default().status(), None);
    }

    #[test]
    fn test_fetch_then_push() {
        let state = reduce(
            OverlayState::default(),
            OverlayAction::Fetched(UsageResponse {
                daily_limit_seconds: 3600,
                usage: 100,
            }),
        );
        let state = reduce(state, OverlayAction::Pushed(101));

        let status = state.status().unwrap();
        assert_eq!(status.remaining, 3499);
        assert!(!status.time_up);
    }

    #[test]
    fn test_time_up_after_limit_change() {
        let state = OverlayState {
            limit_seconds: Some(3600),
            usage: 90,
        };
        let state = reduce(state, OverlayAction::LimitChanged(Some(1)));

        let status = state.status().unwrap();
        assert_eq!(state.limit_seconds, Some(60));
        assert_eq!(status.remaining, 0);
        assert!(status.time_up);
    }

    #[test]
    fn test_removed_limit_falls_back_to_default() {
        let state = reduce(OverlayState::default(), OverlayAction::LimitChanged(None));
        assert_eq!(state.limit_seconds, Some(3600));
    }
}
