use super::host::HostScheduler;
use crate::backend::Backend;
use crate::gatherers::GathererRegistry;
use crate::hosts::{Host, load_all_hosts};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Owns one [`HostScheduler`] per known host and reconciles them with the
/// host registry.
pub struct Coordinator<B: Backend> {
    backend: Arc<B>,
    registry: GathererRegistry,
    hosts: BTreeMap<i32, HostScheduler<B>>,
}

impl<B: Backend> Coordinator<B> {
    #[must_use]
    pub const fn new(backend: Arc<B>, registry: GathererRegistry) -> Self {
        Self {
            backend,
            registry,
            hosts: BTreeMap::new(),
        }
    }

    /// Apply a fresh load of the host registry.
    ///
    /// Known hosts get their new settings, new hosts get a scheduler, and
    /// hosts missing from `hosts` are paused. A paused host keeps its
    /// gatherers, so it resumes with warm caches if it comes back.
    pub fn apply(&mut self, hosts: BTreeMap<i32, Host>) {
        let mut seen = Vec::with_capacity(hosts.len());

        for (id, host) in hosts {
            seen.push(id);

            match self.hosts.entry(id) {
                Entry::Occupied(mut entry) => {
                    let scheduler = entry.get_mut();
                    if !scheduler.target().same_endpoint(&host.target) {
                        warn!(
                            host = %scheduler.target(),
                            new = %host.target,
                            "connection parameters changed, restart to pick them up"
                        );
                    }
                    scheduler.apply_settings(host.settings);
                }
                Entry::Vacant(entry) => {
                    info!(host = %host.target, host_id = id, "new host");
                    let scheduler = entry.insert(HostScheduler::new(
                        Arc::new(host.target),
                        Arc::clone(&self.backend),
                        self.registry.clone(),
                    ));
                    scheduler.apply_settings(host.settings);
                }
            }
        }

        for (id, scheduler) in &mut self.hosts {
            if seen.contains(id) {
                continue;
            }

            let stopped = scheduler.unschedule_all();
            if stopped > 0 {
                info!(host = %scheduler.target(), stopped, "host removed or disabled, pausing gatherers");
            }
        }
    }

    /// Pause every gatherer of every host.
    pub fn shutdown(&mut self) {
        let stopped: usize = self.hosts.values_mut().map(HostScheduler::unschedule_all).sum();
        info!(hosts = self.hosts.len(), stopped, "all gatherers unscheduled");
    }

    #[must_use]
    pub fn host(&self, id: i32) -> Option<&HostScheduler<B>> {
        self.hosts.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Reload the host registry every `every` until `shutdown` flips.
    ///
    /// The first load happens immediately. A failed load keeps the current
    /// schedule in force.
    pub async fn run(mut self, pool: PgPool, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticks = interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match load_all_hosts(&pool).await {
                        Ok(hosts) => {
                            debug!(hosts = hosts.len(), "host registry loaded");
                            self.apply(hosts);
                        }
                        Err(e) => {
                            error!(error = %format!("{e:#}"), "failed to reload hosts, keeping current schedule");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown();
    }
}
