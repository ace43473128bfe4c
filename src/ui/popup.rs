/// Popup UI for X Screen Time

use crate::chrome::{Timeout, open_extension_page};
use crate::clock::{Clock, SystemClock};
use crate::config::{DailyLimit, TrackerConfig};
use crate::report::{format_time, recent_days, remaining_seconds};
use crate::ui::components::{EmptyHistory, StatCard, use_usage_data};
use patternfly_yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlInputElement;
use yew::prelude::*;

const ERROR_NOTICE_MS: u32 = 3000;
const SUCCESS_NOTICE_MS: u32 = 2000;

#[derive(Clone, PartialEq)]
enum Notice {
    Saved,
    Invalid(String),
    Failed(String),
}

#[function_component(App)]
pub fn app() -> Html {
    let config = use_memo((), |_| TrackerConfig::default());
    let (usage, store) = use_usage_data(Some(config.popup_poll_ms));
    let limit_input = use_state(String::new);
    let editing = use_state(|| false);
    let notice = use_state(|| None::<Notice>);
    let notice_timer = use_mut_ref(|| None::<Timeout>);

    // Mirror the stored limit into the field unless the user is typing
    {
        let limit_input = limit_input.clone();
        use_effect_with((usage.data.daily_limit, *editing), move |(limit, editing)| {
            if !*editing {
                limit_input.set(limit.to_string());
            }
            || ()
        });
    }

    let show_notice = {
        let notice = notice.clone();
        let notice_timer = notice_timer.clone();
        move |value: Notice, clear_after_ms: u32| {
            notice.set(Some(value));
            let notice = notice.clone();
            // Replacing the old timeout cancels it
            *notice_timer.borrow_mut() = Some(Timeout::new(clear_after_ms, move || notice.set(None)));
        }
    };

    let on_save = {
        let limit_input = limit_input.clone();
        let store = store.clone();

        Callback::from(move |_: ()| {
            let limit = match limit_input.parse::<DailyLimit>() {
                Ok(limit) => limit,
                Err(e) => {
                    log::debug!("Rejected limit input: {}", e);
                    show_notice(Notice::Invalid(e.user_message().to_string()), ERROR_NOTICE_MS);
                    return;
                }
            };

            let store = store.clone();
            let show_notice = show_notice.clone();
            spawn_local(async move {
                match store.set_limit(limit).await {
                    Ok(()) => {
                        log::info!("Daily limit set to {} minutes", limit);
                        show_notice(Notice::Saved, SUCCESS_NOTICE_MS);
                    }
                    Err(e) => {
                        log::error!("Failed to save limit: {}", e);
                        show_notice(Notice::Failed(format!("Failed to save: {}", e)), ERROR_NOTICE_MS);
                    }
                }
            });
        })
    };

    let on_limit_input = {
        let limit_input = limit_input.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                limit_input.set(input.value());
            }
        })
    };

    let on_focus = {
        let editing = editing.clone();
        Callback::from(move |_| editing.set(true))
    };

    let on_blur = {
        let editing = editing.clone();
        Callback::from(move |_| editing.set(false))
    };

    let on_key_press = {
        let on_save = on_save.clone();
        Callback::from(move |e: KeyboardEvent| {
            if e.key() == "Enter" {
                on_save.emit(());
            }
        })
    };

    let on_save_click = {
        let on_save = on_save.clone();
        Callback::from(move |_| on_save.emit(()))
    };

    let on_view_history = Callback::from(move |_| {
        spawn_local(async move {
            if let Err(e) = open_extension_page("history.html").await {
                log::error!("{}", e);
            }
        });
    });

    if !usage.loaded {
        return html! {
            <div class="padding-20">
                if let Some(err) = usage.error.clone() {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {err}
                    </Alert>
                } else {
                    <Spinner />
                }
            </div>
        };
    }

    let today = SystemClock::new(config.day_boundary).today_key();
    let limit = usage.data.daily_limit;
    let used = usage.data.usage_on(&today);
    let remaining = remaining_seconds(limit.seconds(), used);
    let used_percent = (used as f64 / limit.seconds() as f64 * 100.0).min(100.0);
    let recent = recent_days(&usage.data.usage, config.recent_days);

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"X Screen Time"}</h1>

            <div class="stats-box">
                <StatCard label="残り時間" value={format_time(remaining)} warn={remaining == 0} />
                <StatCard label="今日の使用時間" value={format_time(used)} />
            </div>
            <Progress value={used_percent} />

            <div class="settings">
                <label for="dailyLimit">{"1日の制限時間（分）"}</label>
                <input
                    id="dailyLimit"
                    type="number"
                    min="1"
                    max="1440"
                    value={(*limit_input).clone()}
                    oninput={on_limit_input}
                    onfocus={on_focus}
                    onblur={on_blur}
                    onkeypress={on_key_press}
                    class="limit-input"
                />
                <Button onclick={on_save_click} variant={ButtonVariant::Primary}>
                    {"保存"}
                </Button>
            </div>

            {match &*notice {
                Some(Notice::Saved) => html! {
                    <Alert r#type={AlertType::Success} title={"保存しました"} inline={true}>
                    </Alert>
                },
                Some(Notice::Invalid(msg)) | Some(Notice::Failed(msg)) => html! {
                    <Alert r#type={AlertType::Danger} title={msg.clone()} inline={true}>
                    </Alert>
                },
                None => html! {}
            }}

            <div class="stats-container">
                <h2 class="stats-title">{"最近の履歴"}</h2>
                if recent.is_empty() {
                    <EmptyHistory />
                } else {
                    <div class="history-list">
                        {for recent.iter().map(|day| html! {
                            <div class="history-item">
                                <span class="history-date">{&day.date_label}</span>
                                <span class="history-time">{&day.minutes_label}</span>
                            </div>
                        })}
                    </div>
                }
            </div>

            <Button onclick={on_view_history} variant={ButtonVariant::Link} block={true}>
                {"すべての履歴を見る"}
            </Button>
        </div>
    }
}
