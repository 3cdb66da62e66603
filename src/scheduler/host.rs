use super::executor::HostExecutor;
use super::task::ScheduledGatherer;
use crate::backend::Backend;
use crate::gatherers::{GathererRegistry, GathererType};
use crate::hosts::{HostTarget, MetricKind, Settings};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Keeps one executor and one gatherer per metric kind for a host, in line
/// with the host's latest settings.
pub struct HostScheduler<B: Backend> {
    target: Arc<HostTarget>,
    backend: Arc<B>,
    registry: GathererRegistry,
    executor: Option<HostExecutor>,
    gatherers: BTreeMap<MetricKind, ScheduledGatherer<GathererType<B>>>,
}

impl<B: Backend> HostScheduler<B> {
    #[must_use]
    pub const fn new(target: Arc<HostTarget>, backend: Arc<B>, registry: GathererRegistry) -> Self {
        Self {
            target,
            backend,
            registry,
            executor: None,
            gatherers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    /// Bring every gatherer of this host in line with `settings`.
    ///
    /// Safe to call on every reload: an enabled gatherer that is already
    /// scheduled keeps its registration, a disabled one is paused with its
    /// state kept, and interval changes re-register at the new cadence.
    /// The executor is started on the first call.
    pub fn apply_settings(&mut self, settings: Settings) {
        let executor = self
            .executor
            .get_or_insert_with(|| HostExecutor::spawn(self.target.to_string()))
            .handle();

        for kind in MetricKind::ALL {
            let setting = settings.get(kind);

            let task = self.gatherers.entry(kind).or_insert_with(|| {
                debug!(host = %self.target, gatherer = %kind, "creating gatherer");
                ScheduledGatherer::new(
                    self.target.id,
                    GathererType::new(
                        kind,
                        Arc::clone(&self.target),
                        Arc::clone(&self.backend),
                        self.registry.clone(),
                    ),
                    executor.clone(),
                    self.registry.clone(),
                    setting.interval_seconds,
                )
            });

            task.set_interval_in_seconds(setting.interval_seconds);

            if setting.enabled {
                task.schedule();
            } else {
                task.unschedule();
            }

            task.register();
        }

        info!(
            host = %self.target,
            scheduled = ?self.scheduled_kinds(),
            "settings applied"
        );
    }

    /// Pause every gatherer of this host. Returns how many were running.
    pub fn unschedule_all(&mut self) -> usize {
        let mut stopped = 0;

        for task in self.gatherers.values_mut() {
            if task.is_scheduled() {
                stopped += 1;
            }
            task.unschedule();
            task.register();
        }

        stopped
    }

    #[must_use]
    pub fn is_scheduled(&self, kind: MetricKind) -> bool {
        self.gatherers.get(&kind).is_some_and(ScheduledGatherer::is_scheduled)
    }

    #[must_use]
    pub fn interval(&self, kind: MetricKind) -> Option<Duration> {
        self.gatherers.get(&kind).map(ScheduledGatherer::interval)
    }

    #[must_use]
    pub fn gatherer(&self, kind: MetricKind) -> Option<&Arc<Mutex<GathererType<B>>>> {
        self.gatherers.get(&kind).map(ScheduledGatherer::gatherer)
    }

    #[must_use]
    pub fn scheduled_kinds(&self) -> Vec<MetricKind> {
        self.gatherers
            .iter()
            .filter(|(_, task)| task.is_scheduled())
            .map(|(kind, _)| *kind)
            .collect()
    }

    #[must_use]
    pub const fn has_executor(&self) -> bool {
        self.executor.is_some()
    }
}
