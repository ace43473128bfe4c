/// Full usage history page

use crate::report::{HistoryStats, history_rows};
use crate::ui::components::{EmptyHistory, StatCard, use_usage_data};
use patternfly_yew::prelude::*;
use yew::prelude::*;

#[function_component(HistoryPage)]
pub fn history_page() -> Html {
    let (usage, _store) = use_usage_data(None);

    if !usage.loaded {
        return html! {
            <div class="loading-text-center">
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

    let stats = HistoryStats::from_usage(&usage.data.usage);
    let rows = history_rows(&usage.data.usage, usage.data.daily_limit.seconds());

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"使用履歴"}</h1>

            <div class="stats-box">
                <StatCard label="記録日数" value={stats.days_label()} />
                <StatCard label="1日平均" value={stats.average_label()} />
                <StatCard label="合計" value={stats.total_label()} />
            </div>

            if rows.is_empty() {
                <EmptyHistory />
            } else {
                <div class="history-list">
                    {for rows.iter().map(|row| {
                        let class = if row.over_limit {
                            "history-item over-limit"
                        } else {
                            "history-item"
                        };

                        html! {
                            <div class={class}>
                                <div>
                                    <span class="history-date">{&row.date_label}</span>
                                    if let Some(weekday) = row.weekday {
                                        <span class="history-weekday">{format!("({})", weekday)}</span>
                                    }
                                </div>
                                <div class="history-bar-container">
                                    <div class="history-bar" style={format!("width: {}%", row.bar_percent)}></div>
                                </div>
                                <span class="history-time">{format!("{}分", row.minutes)}</span>
                            </div>
                        }
                    })}
                </div>
            }
        </div>
    }
}
