/// Usage counter: the single interval timer and its tick
use crate::clock::Clock;
use crate::error::{DeliveryError, StorageError};
use crate::storage::{KeyValueStore, UsageStore};
use crate::usage_data::{Message, TabId};

/// Host timer facility (setInterval/clearInterval in the browser)
///
/// Implementations arrange for the counter's tick to run for `tab_id`
/// every `period_ms` until the handle is cancelled.
pub trait IntervalTimer {
    type Handle;

    fn start(&mut self, tab_id: TabId, period_ms: u32) -> Self::Handle;
    fn cancel(&mut self, handle: Self::Handle);
}

/// Delivers pushes to the in-page overlay of a tab
#[allow(async_fn_in_trait)]
pub trait TabMessenger {
    async fn send_to_tab(&self, tab_id: TabId, message: &Message) -> Result<(), DeliveryError>;
}

#[derive(Debug)]
pub enum CounterState<H> {
    Idle,
    Running { tab_id: TabId, timer: H },
}

/// Result of [`UsageCounter::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// The previous tab's timer was cancelled first
    Switched { from: TabId },
}

/// Owns at most one running timer
pub struct UsageCounter<T: IntervalTimer> {
    timer: T,
    period_ms: u32,
    state: CounterState<T::Handle>,
}

impl<T: IntervalTimer> UsageCounter<T> {
    pub fn new(timer: T, period_ms: u32) -> Self {
        UsageCounter {
            timer,
            period_ms,
            state: CounterState::Idle,
        }
    }

    pub fn tracked_tab(&self) -> Option<TabId> {
        match self.state {
            CounterState::Idle => None,
            CounterState::Running { tab_id, .. } => Some(tab_id),
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.tracked_tab().is_some()
    }

    /// Begin counting for `tab_id`
    ///
    /// Same tab: no-op. Different tab: stop, then start.
    pub fn start(&mut self, tab_id: TabId) -> StartOutcome {
        let outcome = match self.tracked_tab() {
            Some(current) if current == tab_id => return StartOutcome::AlreadyRunning,
            Some(current) => {
                self.stop();
                StartOutcome::Switched { from: current }
            }
            None => StartOutcome::Started,
        };

        let timer = self.timer.start(tab_id, self.period_ms);
        self.state = CounterState::Running { tab_id, timer };
        log::info!("Counting started for tab {}", tab_id);
        outcome
    }

    /// Cancel the pending tick; returns the tab that was being counted
    pub fn stop(&mut self) -> Option<TabId> {
        match std::mem::replace(&mut self.state, CounterState::Idle) {
            CounterState::Idle => None,
            CounterState::Running { tab_id, timer } => {
                self.timer.cancel(timer);
                log::info!("Counting stopped for tab {}", tab_id);
                Some(tab_id)
            }
        }
    }
}

/// One tick: book a second against today and push the new total to the tab
///
/// A failed push is logged and swallowed.
pub async fn record_tick<S, M>(
    store: &UsageStore<S>,
    clock: &dyn Clock,
    messenger: &M,
    tab_id: TabId,
) -> Result<u64, StorageError>
where
    S: KeyValueStore,
    M: TabMessenger,
{
    let today = clock.today_key();
    let usage = store.increment(&today).await?;

    if let Err(e) = messenger
        .send_to_tab(tab_id, &Message::UpdateTimer { usage })
        .await
    {
        log::debug!("Ignoring undelivered timer update: {}", e);
    }

    Ok(usage)
}
