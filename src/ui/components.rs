/// Shared view state and reusable UI pieces

use crate::chrome::{ChromeStorage, Interval, listen_storage_changes};
use crate::storage::{StorageChange, StorageData, UsageStore};
use std::rc::Rc;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

/// Persisted data as seen by a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageState {
    pub data: StorageData,
    pub loaded: bool,
    pub error: Option<String>,
}

pub enum UsageAction {
    Loaded(StorageData),
    Changed(StorageChange),
    Failed(String),
}

impl Reducible for UsageState {
    type Action = UsageAction;

    fn reduce(self: Rc<Self>, action: Self::Action) -> Rc<Self> {
        let mut next = (*self).clone();
        match action {
            UsageAction::Loaded(data) => {
                next.data = data;
                next.loaded = true;
                next.error = None;
            }
            UsageAction::Changed(change) => next.data.apply(&change),
            UsageAction::Failed(err) => next.error = Some(err),
        }
        Rc::new(next)
    }
}

pub type PageStore = Rc<UsageStore<ChromeStorage>>;

fn load(store: PageStore, dispatcher: UseReducerDispatcher<UsageState>) {
    spawn_local(async move {
        match store.snapshot().await {
            Ok(data) => dispatcher.dispatch(UsageAction::Loaded(data)),
            Err(e) => {
                log::error!("Failed to load usage: {}", e);
                dispatcher.dispatch(UsageAction::Failed(format!("Failed to load: {}", e)));
            }
        }
    });
}

/// Load usage + limit, follow storage changes, and optionally re-poll
#[hook]
pub fn use_usage_data(poll_ms: Option<u32>) -> (UseReducerHandle<UsageState>, PageStore) {
    let state = use_reducer(UsageState::default);
    let store: PageStore = use_memo((), |_| UsageStore::new(ChromeStorage));

    {
        let dispatcher = state.dispatcher();
        let store = store.clone();

        use_effect_with((), move |_| {
            load(store.clone(), dispatcher.clone());

            let subscription = {
                let dispatcher = dispatcher.clone();
                store.changes().subscribe(move |change| {
                    dispatcher.dispatch(UsageAction::Changed(change.clone()));
                })
            };

            // Changes written by the background worker or another page
            let host_listener = {
                let store = store.clone();
                listen_storage_changes(move |changes| store.publish_external(changes))
            };

            let poll = poll_ms.map(|ms| {
                let store = store.clone();
                Interval::new(ms, move || load(store.clone(), dispatcher.clone()))
            });

            move || {
                drop(host_listener);
                drop(poll);
                store.changes().unsubscribe(subscription);
            }
        });
    }

    (state, store)
}

#[derive(Properties, PartialEq)]
pub struct StatCardProps {
    pub label: AttrValue,
    pub value: AttrValue,
    #[prop_or(false)]
    pub warn: bool,
}

#[function_component(StatCard)]
pub fn stat_card(props: &StatCardProps) -> Html {
    let value_class = if props.warn {
        "stat-value stat-value-warn"
    } else {
        "stat-value"
    };

    html! {
        <div class="stat-card">
            <span class="stat-label">{props.label.clone()}</span>
            <span class={value_class}>{props.value.clone()}</span>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct EmptyHistoryProps {
    #[prop_or_default]
    pub message: Option<AttrValue>,
}

#[function_component(EmptyHistory)]
pub fn empty_history(props: &EmptyHistoryProps) -> Html {
    let message = props
        .message
        .clone()
        .unwrap_or_else(|| AttrValue::from("履歴がありません"));

    html! {
        <div class="no-history">{message}</div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DailyLimit;
    use crate::usage_data::DailyUsage;

    fn reduce(state: UsageState, action: UsageAction) -> UsageState {
        (*Rc::new(state).reduce(action)).clone()
    }

    #[test]
    fn test_loaded_clears_error() {
        let state = UsageState {
            error: Some("boom".to_string()),
            ..Default::default()
        };
        let data = StorageData {
            usage: DailyUsage::from([("2024-01-01".to_string(), 10)]),
            daily_limit: DailyLimit::new(5).unwrap(),
        };

        let state = reduce(state, UsageAction::Loaded(data.clone()));

        assert!(state.loaded);
        assert_eq!(state.error, None);
        assert_eq!(state.data, data);
    }

    #[test]
    fn test_changes_fold_into_state() {
        let state = reduce(
            UsageState::default(),
            UsageAction::Changed(StorageChange::DailyLimit(Some(30))),
        );
        let state = reduce(
            state,
            UsageAction::Changed(StorageChange::Usage(DailyUsage::from([(
                "2024-01-01".to_string(),
                61,
            )]))),
        );

        assert_eq!(state.data.daily_limit.minutes(), 30);
        assert_eq!(state.data.usage_on("2024-01-01"), 61);
    }

    #[test]
    fn test_failure_keeps_data() {
        let state = reduce(
            UsageState::default(),
            UsageAction::Changed(StorageChange::DailyLimit(Some(30))),
        );
        let state = reduce(state, UsageAction::Failed("offline".to_string()));

        assert_eq!(state.error.as_deref(), Some("offline"));
        assert_eq!(state.data.daily_limit.minutes(), 30);
    }
}
