/// Tab/focus monitor: turns host tab and window events into start/stop decisions
use crate::clock::Clock;
use crate::config::{DailyLimit, TrackerConfig};
use crate::counter::{IntervalTimer, StartOutcome, TabMessenger, UsageCounter, record_tick};
use crate::error::{HostError, StorageError, TrackerError};
use crate::site::matches_hosts;
use crate::storage::{KeyValueStore, UsageStore};
use crate::usage_data::{Message, TabId, TabInfo, UsageResponse};
use std::cell::{Cell, RefCell};

/// `chrome.windows.WINDOW_ID_NONE`: every browser window lost focus
pub const WINDOW_ID_NONE: i32 = -1;

/// Tab queries the monitor needs from the host browser
#[allow(async_fn_in_trait)]
pub trait BrowserTabs: TabMessenger {
    /// Active tab of the last focused window, if any
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError>;

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError>;

    /// Id of the window holding OS focus; `None` when the browser is in the background
    async fn focused_window(&self) -> Result<Option<i32>, HostError>;
}

/// What a reconcile or event handler decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Track(TabId),
    Stop,
    /// Event concerned a tab or change the monitor does not care about
    Ignore,
}

/// Background state: the counter plus everything it needs to tick
pub struct Tracker<S, B, T: IntervalTimer> {
    config: TrackerConfig,
    store: UsageStore<S>,
    tabs: B,
    clock: Box<dyn Clock>,
    counter: RefCell<UsageCounter<T>>,
    /// Last known focused window, refreshed by reconcile and focus events
    focused_window: Cell<Option<i32>>,
}

impl<S, B, T> Tracker<S, B, T>
where
    S: KeyValueStore,
    B: BrowserTabs,
    T: IntervalTimer,
{
    pub fn new(config: TrackerConfig, store: UsageStore<S>, tabs: B, clock: Box<dyn Clock>, timer: T) -> Self {
        let counter = UsageCounter::new(timer, config.tick_ms);
        Tracker {
            config,
            store,
            tabs,
            clock,
            counter: RefCell::new(counter),
            focused_window: Cell::new(None),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &UsageStore<S> {
        &self.store
    }

    #[cfg(test)]
    pub fn tabs(&self) -> &B {
        &self.tabs
    }

    pub fn tracked_tab(&self) -> Option<TabId> {
        self.counter.borrow().tracked_tab()
    }

    pub fn is_tracked_url(&self, url: &str) -> bool {
        matches_hosts(url, self.config.tracked_hosts.as_slice())
    }

    /// Query the focused window's active tab and start or stop accordingly
    pub async fn reconcile(&self) -> Result<Decision, TrackerError> {
        let focused = self.tabs.focused_window().await?;
        self.focused_window.set(focused);
        self.reconcile_focused().await
    }

    async fn reconcile_focused(&self) -> Result<Decision, TrackerError> {
        let decision = match self.tabs.active_tab().await? {
            Some(tab) => self.decide(&tab),
            None => Decision::Stop,
        };
        self.apply(decision);
        Ok(decision)
    }

    pub async fn on_tab_activated(&self, tab_id: TabId) -> Result<Decision, TrackerError> {
        let tab = self.tabs.get_tab(tab_id).await?;
        // Switching tabs in a background window leaves the focused one alone
        let decision = if self.is_focused(tab.window_id) {
            self.decide(&tab)
        } else {
            Decision::Ignore
        };
        self.apply(decision);
        Ok(decision)
    }

    /// A tab's URL changed; only the active tab matters
    pub async fn on_tab_updated(
        &self,
        tab_id: TabId,
        new_url: Option<&str>,
    ) -> Result<Decision, TrackerError> {
        let Some(url) = new_url else {
            return Ok(Decision::Ignore);
        };

        let decision = match self.tabs.active_tab().await? {
            Some(active) if active.id == tab_id => {
                if self.is_focused(active.window_id) && self.is_tracked_url(url) {
                    Decision::Track(tab_id)
                } else {
                    Decision::Stop
                }
            }
            _ => Decision::Ignore,
        };
        self.apply(decision);
        Ok(decision)
    }

    pub async fn on_focus_changed(&self, window_id: i32) -> Result<Decision, TrackerError> {
        if window_id == WINDOW_ID_NONE {
            self.focused_window.set(None);
            self.apply(Decision::Stop);
            return Ok(Decision::Stop);
        }
        self.focused_window.set(Some(window_id));
        self.reconcile_focused().await
    }

    pub fn on_tab_removed(&self, tab_id: TabId) -> Decision {
        if self.tracked_tab() == Some(tab_id) {
            self.apply(Decision::Stop);
            Decision::Stop
        } else {
            Decision::Ignore
        }
    }

    /// Extension installed or updated: seed the default limit, then reconcile
    pub async fn on_installed(&self) -> Result<Decision, TrackerError> {
        let default = DailyLimit::new(self.config.default_limit_minutes).unwrap_or_default();
        if self.store.ensure_limit(default).await? {
            log::info!("Daily limit initialised to {} minutes", default);
        }
        self.reconcile().await
    }

    /// Interval callback; a tick for a tab that is no longer tracked is dropped
    pub async fn tick(&self, tab_id: TabId) -> Result<Option<u64>, StorageError> {
        if self.tracked_tab() != Some(tab_id) {
            log::debug!("Dropping stale tick for tab {}", tab_id);
            return Ok(None);
        }

        let usage = record_tick(&self.store, self.clock.as_ref(), &self.tabs, tab_id).await?;
        Ok(Some(usage))
    }

    pub async fn usage_response(&self) -> Result<UsageResponse, StorageError> {
        let today = self.clock.today_key();
        let limit = self.store.get_limit().await?;
        let usage = self.store.get_usage(&today).await?;

        Ok(UsageResponse {
            daily_limit_seconds: limit.seconds(),
            usage,
        })
    }

    /// Runtime message from the overlay or a page
    pub async fn handle_message(&self, message: &Message) -> Result<Option<UsageResponse>, StorageError> {
        match message {
            Message::GetUsage => self.usage_response().await.map(Some),
            Message::UpdateTimer { .. } => Ok(None),
        }
    }

    fn is_focused(&self, window_id: i32) -> bool {
        self.focused_window.get() == Some(window_id)
    }

    fn decide(&self, tab: &TabInfo) -> Decision {
        if self.is_focused(tab.window_id) && self.is_tracked_url(&tab.url) {
            Decision::Track(tab.id)
        } else {
            Decision::Stop
        }
    }

    fn apply(&self, decision: Decision) {
        let mut counter = self.counter.borrow_mut();
        match decision {
            Decision::Track(tab_id) => {
                if let StartOutcome::Switched { from } = counter.start(tab_id) {
                    log::debug!("Switched counting from tab {} to {}", from, tab_id);
                }
            }
            Decision::Stop => {
                counter.stop();
            }
            Decision::Ignore => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::counter::testing::FakeTimer;
    use crate::error::DeliveryError;
    use crate::storage::{DAILY_LIMIT_KEY, MemoryStore};
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct FakeTabs {
        tabs: RefCell<HashMap<TabId, TabInfo>>,
        active: RefCell<Option<TabId>>,
        focused: Cell<Option<i32>>,
        closed: RefCell<HashSet<TabId>>,
        pushes: RefCell<Vec<(TabId, Message)>>,
    }

    impl FakeTabs {
        fn open(&self, id: TabId, url: &str) {
            self.open_in(id, url, 1);
        }

        fn open_in(&self, id: TabId, url: &str, window_id: i32) {
            self.tabs
                .borrow_mut()
                .insert(id, TabInfo::new(id, url.to_string(), window_id));
        }

        fn focus(&self, window_id: Option<i32>) {
            self.focused.set(window_id);
        }

        fn activate(&self, id: Option<TabId>) {
            *self.active.borrow_mut() = id;
        }

        fn navigate(&self, id: TabId, url: &str) {
            if let Some(tab) = self.tabs.borrow_mut().get_mut(&id) {
                tab.url = url.to_string();
            }
        }

        fn close(&self, id: TabId) {
            self.tabs.borrow_mut().remove(&id);
            self.closed.borrow_mut().insert(id);
        }
    }

    impl TabMessenger for FakeTabs {
        async fn send_to_tab(&self, tab_id: TabId, message: &Message) -> Result<(), DeliveryError> {
            if self.closed.borrow().contains(&tab_id) {
                return Err(DeliveryError {
                    tab_id,
                    reason: "No tab with id".to_string(),
                });
            }
            self.pushes.borrow_mut().push((tab_id, message.clone()));
            Ok(())
        }
    }

    impl BrowserTabs for FakeTabs {
        async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
            let active = *self.active.borrow();
            Ok(active.and_then(|id| self.tabs.borrow().get(&id).cloned()))
        }

        async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
            self.tabs
                .borrow()
                .get(&tab_id)
                .cloned()
                .ok_or_else(|| HostError(format!("No tab with id: {}", tab_id)))
        }

        async fn focused_window(&self) -> Result<Option<i32>, HostError> {
            Ok(self.focused.get())
        }
    }

    type TestTracker = Tracker<MemoryStore, FakeTabs, FakeTimer>;

    fn tracker() -> (TestTracker, FakeTimer) {
        let timer = FakeTimer::default();
        let tabs = FakeTabs::default();
        tabs.focus(Some(1));
        let tracker = Tracker::new(
            TrackerConfig::default(),
            UsageStore::new(MemoryStore::new()),
            tabs,
            Box::new(FixedClock::new("2024-01-01")),
            timer.clone(),
        );
        (tracker, timer)
    }

    #[tokio::test]
    async fn test_reconcile_tracked_tab() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));

        assert_eq!(tracker.reconcile().await.unwrap(), Decision::Track(1));
        assert_eq!(tracker.tracked_tab(), Some(1));
    }

    #[tokio::test]
    async fn test_reconcile_without_active_tab_stops() {
        let (tracker, timer) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        tracker.tabs().activate(None);
        assert_eq!(tracker.reconcile().await.unwrap(), Decision::Stop);
        assert_eq!(tracker.tracked_tab(), None);
        assert_eq!(timer.log.active.get(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (tracker, timer) = tracker();
        tracker.tabs().open(1, "https://twitter.com/foo");
        tracker.tabs().activate(Some(1));

        tracker.reconcile().await.unwrap();
        tracker.reconcile().await.unwrap();
        tracker.reconcile().await.unwrap();

        assert_eq!(timer.log.started.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_activation_switches_between_tracked_tabs() {
        let (tracker, timer) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().open(2, "https://twitter.com/explore");
        tracker.reconcile().await.unwrap();

        tracker.on_tab_activated(1).await.unwrap();
        tracker.on_tab_activated(2).await.unwrap();

        assert_eq!(tracker.tracked_tab(), Some(2));
        assert_eq!(timer.log.max_active.get(), 1);
        assert_eq!(*timer.log.cancelled.borrow(), vec![1]);
    }

    #[tokio::test]
    async fn test_activation_of_other_site_stops() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().open(2, "https://example.com");
        tracker.reconcile().await.unwrap();

        tracker.on_tab_activated(1).await.unwrap();
        assert_eq!(tracker.on_tab_activated(2).await.unwrap(), Decision::Stop);
        assert_eq!(tracker.tracked_tab(), None);
    }

    #[tokio::test]
    async fn test_navigation_away_stops_before_next_tick() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        tracker.tick(1).await.unwrap();
        tracker.tick(1).await.unwrap();

        tracker.tabs().navigate(1, "https://example.com/");
        let decision = tracker
            .on_tab_updated(1, Some("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Stop);

        // An interval callback already queued must not count
        assert_eq!(tracker.tick(1).await.unwrap(), None);
        assert_eq!(tracker.store().get_usage("2024-01-01").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_navigation_in_background_tab_is_ignored() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().open(2, "https://example.com");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        let decision = tracker
            .on_tab_updated(2, Some("https://news.example.com"))
            .await
            .unwrap();

        assert_eq!(decision, Decision::Ignore);
        assert_eq!(tracker.tracked_tab(), Some(1));
    }

    #[tokio::test]
    async fn test_update_without_url_change_is_ignored() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://example.com");
        tracker.tabs().activate(Some(1));

        assert_eq!(tracker.on_tab_updated(1, None).await.unwrap(), Decision::Ignore);
    }

    #[tokio::test]
    async fn test_navigation_onto_tracked_site_starts() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://example.com");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        tracker.tabs().navigate(1, "https://x.com/home");
        let decision = tracker
            .on_tab_updated(1, Some("https://x.com/home"))
            .await
            .unwrap();

        assert_eq!(decision, Decision::Track(1));
    }

    #[tokio::test]
    async fn test_window_blur_stops_even_on_tracked_tab() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.on_focus_changed(1).await.unwrap();
        assert_eq!(tracker.tracked_tab(), Some(1));

        assert_eq!(
            tracker.on_focus_changed(WINDOW_ID_NONE).await.unwrap(),
            Decision::Stop
        );
        assert_eq!(tracker.tracked_tab(), None);

        tracker.on_focus_changed(1).await.unwrap();
        assert_eq!(tracker.tracked_tab(), Some(1));
    }

    #[tokio::test]
    async fn test_navigation_while_unfocused_does_not_start() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://example.com");
        tracker.tabs().activate(Some(1));
        tracker.on_focus_changed(1).await.unwrap();

        tracker.tabs().focus(None);
        tracker.on_focus_changed(WINDOW_ID_NONE).await.unwrap();

        tracker.tabs().navigate(1, "https://x.com/home");
        let decision = tracker
            .on_tab_updated(1, Some("https://x.com/home"))
            .await
            .unwrap();

        assert_eq!(decision, Decision::Stop);
        assert_eq!(tracker.tracked_tab(), None);
        assert_eq!(tracker.tick(1).await.unwrap(), None);
        assert_eq!(tracker.store().get_usage("2024-01-01").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_without_focused_window_stops() {
        let (tracker, timer) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.tabs().focus(None);

        assert_eq!(tracker.reconcile().await.unwrap(), Decision::Stop);
        assert_eq!(tracker.tracked_tab(), None);
        assert_eq!(timer.log.active.get(), 0);

        tracker.tabs().focus(Some(1));
        assert_eq!(tracker.reconcile().await.unwrap(), Decision::Track(1));
    }

    #[tokio::test]
    async fn test_activation_in_unfocused_window_is_ignored() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().open_in(2, "https://twitter.com/explore", 2);
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        assert_eq!(tracker.on_tab_activated(2).await.unwrap(), Decision::Ignore);
        assert_eq!(tracker.tracked_tab(), Some(1));

        tracker.on_focus_changed(2).await.unwrap();
        assert_eq!(tracker.on_tab_activated(2).await.unwrap(), Decision::Track(2));
    }

    #[tokio::test]
    async fn test_removing_tracked_tab_stops() {
        let (tracker, timer) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        assert_eq!(tracker.on_tab_removed(7), Decision::Ignore);
        assert_eq!(tracker.tracked_tab(), Some(1));

        tracker.tabs().close(1);
        assert_eq!(tracker.on_tab_removed(1), Decision::Stop);
        assert_eq!(timer.log.active.get(), 0);
    }

    #[tokio::test]
    async fn test_tick_pushes_to_tracked_tab() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        assert_eq!(tracker.tick(1).await.unwrap(), Some(1));
        assert_eq!(tracker.tick(1).await.unwrap(), Some(2));

        assert_eq!(
            *tracker.tabs().pushes.borrow(),
            vec![
                (1, Message::UpdateTimer { usage: 1 }),
                (1, Message::UpdateTimer { usage: 2 }),
            ]
        );
    }

    #[tokio::test]
    async fn test_tick_survives_closed_tab() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));
        tracker.reconcile().await.unwrap();

        // Closed between the tick firing and delivery
        tracker.tabs().close(1);
        assert_eq!(tracker.tick(1).await.unwrap(), Some(1));
        assert_eq!(tracker.tracked_tab(), Some(1));
    }

    #[tokio::test]
    async fn test_install_seeds_limit_and_reconciles() {
        let (tracker, _) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));

        assert_eq!(tracker.on_installed().await.unwrap(), Decision::Track(1));
        assert_eq!(tracker.store().get_limit().await.unwrap().minutes(), 60);
    }

    #[tokio::test]
    async fn test_install_replayed_after_startup_reconcile() {
        let (tracker, timer) = tracker();
        tracker.tabs().open(1, "https://x.com/home");
        tracker.tabs().activate(Some(1));

        // Worker start: reconcile first, then the queued install event
        tracker.reconcile().await.unwrap();
        assert_eq!(tracker.on_installed().await.unwrap(), Decision::Track(1));

        assert_eq!(tracker.store().get_limit().await.unwrap().minutes(), 60);
        assert_eq!(
            tracker.store().backend().get(DAILY_LIMIT_KEY).await.unwrap(),
            Some(serde_json::json!(60))
        );
        assert_eq!(timer.log.started.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_install_keeps_existing_limit() {
        let (tracker, _) = tracker();
        tracker
            .store()
            .set_limit(DailyLimit::new(20).unwrap())
            .await
            .unwrap();

        tracker.on_installed().await.unwrap();
        assert_eq!(tracker.store().get_limit().await.unwrap().minutes(), 20);
    }

    #[tokio::test]
    async fn test_get_usage_converts_limit_to_seconds() {
        let (tracker, _) = tracker();
        tracker
            .store()
            .set_limit(DailyLimit::new(1).unwrap())
            .await
            .unwrap();
        for _ in 0..90 {
            tracker.store().increment("2024-01-01").await.unwrap();
        }

        let response = tracker.handle_message(&Message::GetUsage).await.unwrap();
        assert_eq!(
            response,
            Some(UsageResponse {
                daily_limit_seconds: 60,
                usage: 90,
            })
        );
    }

    #[tokio::test]
    async fn test_push_messages_get_no_response() {
        let (tracker, _) = tracker();
        let response = tracker
            .handle_message(&Message::UpdateTimer { usage: 3 })
            .await
            .unwrap();
        assert_eq!(response, None);
    }

    #[tokio::test]
    async fn test_unknown_tab_activation_is_an_error() {
        let (tracker, _) = tracker();
        assert!(matches!(
            tracker.on_tab_activated(42).await,
            Err(TrackerError::Host(_))
        ));
    }
}
