use super::executor::ExecutorHandle;
use crate::gatherers::{Gatherer, GathererKey, GathererRegistry};
use crate::hosts::settings::{MAX_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS};
use futures::FutureExt as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

/// Clamp a configured interval to something schedulable.
#[must_use]
pub fn interval_from_seconds(seconds: u64) -> Duration {
    Duration::from_secs(seconds.clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS))
}

fn warn_if_clamped(host: &str, key: GathererKey, seconds: u64, interval: Duration) {
    if interval.as_secs() != seconds {
        warn!(
            host,
            gatherer = %key.kind,
            seconds,
            minimum = MIN_INTERVAL_SECONDS,
            maximum = MAX_INTERVAL_SECONDS,
            clamped = interval.as_secs(),
            "interval out of range, clamping"
        );
    }
}

struct Ticker {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn cancel(self) {
        // Jobs already queued on the executor check the flag before starting.
        self.active.store(false, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// A gatherer plus its periodic registration on the host executor.
///
/// Scheduling spawns a ticker that, once per interval, queues one
/// `gather_data` job and waits for it to finish before arming the next
/// tick, so runs of the same gatherer never overlap. The first tick fires
/// one full interval after scheduling. Unscheduling cancels future ticks
/// only; a run already in progress completes, and the gatherer with all of
/// its state stays here for the next `schedule`.
pub struct ScheduledGatherer<G: Gatherer> {
    key: GathererKey,
    host: String,
    gatherer: Arc<Mutex<G>>,
    executor: ExecutorHandle,
    registry: GathererRegistry,
    interval: Duration,
    ticker: Option<Ticker>,
}

impl<G: Gatherer> ScheduledGatherer<G> {
    #[must_use]
    pub fn new(
        host_id: i32,
        gatherer: G,
        executor: ExecutorHandle,
        registry: GathererRegistry,
        interval_seconds: u64,
    ) -> Self {
        let key = GathererKey::new(host_id, gatherer.kind());
        let host = executor.label().to_string();
        let interval = interval_from_seconds(interval_seconds);
        warn_if_clamped(&host, key, interval_seconds, interval);

        Self {
            key,
            host,
            gatherer: Arc::new(Mutex::new(gatherer)),
            executor,
            registry,
            interval,
            ticker: None,
        }
    }

    #[must_use]
    pub const fn key(&self) -> GathererKey {
        self.key
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.ticker.is_some()
    }

    /// Shared access to the gatherer, e.g. for inspecting its state.
    #[must_use]
    pub const fn gatherer(&self) -> &Arc<Mutex<G>> {
        &self.gatherer
    }

    /// Change the cadence of future runs.
    ///
    /// A scheduled gatherer is re-registered at the new interval and stays
    /// scheduled; an unscheduled one just remembers it. Setting the current
    /// interval again does nothing and returns `false`.
    pub fn set_interval_in_seconds(&mut self, seconds: u64) -> bool {
        let interval = interval_from_seconds(seconds);
        if interval == self.interval {
            return false;
        }

        warn_if_clamped(&self.host, self.key, seconds, interval);

        debug!(
            host = %self.host,
            gatherer = %self.key.kind,
            from = self.interval.as_secs(),
            to = interval.as_secs(),
            "interval changed"
        );
        self.interval = interval;

        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
            self.ticker = Some(self.spawn_ticker());
        }

        true
    }

    /// Start periodic runs. No-op when already scheduled.
    pub fn schedule(&mut self) {
        if self.ticker.is_some() {
            return;
        }

        debug!(
            host = %self.host,
            gatherer = %self.key.kind,
            interval_seconds = self.interval.as_secs(),
            "scheduled"
        );
        self.ticker = Some(self.spawn_ticker());
    }

    /// Stop future runs, keeping the gatherer and its state.
    pub fn unschedule(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            debug!(host = %self.host, gatherer = %self.key.kind, "unscheduled");
            ticker.cancel();
        }
    }

    /// Publish identity, interval and schedule state to the registry.
    pub fn register(&self) {
        self.registry
            .register(self.key, &self.host, self.interval, self.is_scheduled());
    }

    fn spawn_ticker(&self) -> Ticker {
        let active = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_ticker(
            Arc::clone(&self.gatherer),
            self.executor.clone(),
            self.interval,
            Arc::clone(&active),
            self.key,
        ));

        Ticker { active, handle }
    }
}

impl<G: Gatherer> Drop for ScheduledGatherer<G> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

async fn run_ticker<G: Gatherer>(
    gatherer: Arc<Mutex<G>>,
    executor: ExecutorHandle,
    period: Duration,
    active: Arc<AtomicBool>,
    key: GathererKey,
) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        let (done, finished) = oneshot::channel::<()>();
        let gatherer = Arc::clone(&gatherer);
        let job_active = Arc::clone(&active);

        let job = async move {
            if job_active.load(Ordering::SeqCst) {
                let mut gatherer = gatherer.lock().await;
                gatherer.gather_data().await;
            }
            let _ = done.send(());
        }
        .boxed();

        if let Err(e) = executor.submit(job) {
            warn!(host = %executor.label(), gatherer = %key.kind, error = %e, "stopping ticker");
            return;
        }

        // The next tick is armed only after this run has returned. A run
        // that panicked drops `done`; the executor survives it, so keep ticking.
        if finished.await.is_err() {
            warn!(host = %executor.label(), gatherer = %key.kind, "run ended without completing");
        }
    }
}
