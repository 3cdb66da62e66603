use crate::gatherers::GatherStats;
use crate::hosts::MetricKind;
use anyhow::Result;
use chrono::{DateTime, Utc};
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

const LABELS: [&str; 2] = ["host", "gatherer"];

/// Identifies one gatherer across the whole process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GathererKey {
    pub host_id: i32,
    pub kind: MetricKind,
}

impl GathererKey {
    #[must_use]
    pub const fn new(host_id: i32, kind: MetricKind) -> Self {
        Self { host_id, kind }
    }
}

/// Health view of one gatherer, as served on `/gatherers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GathererStatus {
    pub host_id: i32,
    pub host: String,
    pub gatherer: MetricKind,
    pub interval_seconds: u64,
    pub scheduled: bool,
    pub runs: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_success: Option<bool>,
    pub last_error: Option<String>,
    pub last_stats: Option<GatherStats>,
}

impl GathererStatus {
    fn new(key: GathererKey, host: &str) -> Self {
        Self {
            host_id: key.host_id,
            host: host.to_string(),
            gatherer: key.kind,
            interval_seconds: 0,
            scheduled: false,
            runs: 0,
            failures: 0,
            last_run: None,
            last_duration_ms: None,
            last_success: None,
            last_error: None,
            last_stats: None,
        }
    }
}

/// Outcome of one tick.
#[derive(Clone, Debug)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub result: Result<GatherStats, String>,
}

#[derive(Clone)]
struct GathererMetrics {
    runs_total: IntCounterVec,
    failures_total: IntCounterVec,
    run_duration_seconds: HistogramVec,
    last_run_timestamp: GaugeVec,
    last_run_success: GaugeVec,
    samples_read_total: IntCounterVec,
    samples_written_total: IntCounterVec,
    scheduled: IntGaugeVec,
    interval_seconds: IntGaugeVec,
}

#[allow(clippy::expect_used)]
fn int_counter(name: &str, help: &str) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), &LABELS).expect("gatherer counter")
}

#[allow(clippy::expect_used)]
fn int_gauge(name: &str, help: &str) -> IntGaugeVec {
    IntGaugeVec::new(Opts::new(name, help), &LABELS).expect("gatherer gauge")
}

#[allow(clippy::expect_used)]
fn gauge(name: &str, help: &str) -> GaugeVec {
    GaugeVec::new(Opts::new(name, help), &LABELS).expect("gatherer gauge")
}

impl GathererMetrics {
    #[allow(clippy::expect_used)]
    fn new() -> Self {
        Self {
            runs_total: int_counter("pg_gatherer_runs_total", "Ticks executed per gatherer"),
            failures_total: int_counter("pg_gatherer_failures_total", "Failed ticks per gatherer"),
            run_duration_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "pg_gatherer_run_duration_seconds",
                    "Time spent in one tick, read and write phase together",
                )
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0]),
                &LABELS,
            )
            .expect("pg_gatherer_run_duration_seconds"),
            last_run_timestamp: gauge(
                "pg_gatherer_last_run_timestamp_seconds",
                "Unix timestamp of the last tick",
            ),
            last_run_success: gauge(
                "pg_gatherer_last_run_success",
                "Whether the last tick succeeded (1=success, 0=failure)",
            ),
            samples_read_total: int_counter(
                "pg_gatherer_samples_read_total",
                "Buffered samples processed by successful flushes",
            ),
            samples_written_total: int_counter(
                "pg_gatherer_samples_written_total",
                "Rows written to the sink",
            ),
            scheduled: int_gauge(
                "pg_gatherer_scheduled",
                "Whether the gatherer is currently scheduled (1) or paused (0)",
            ),
            interval_seconds: int_gauge(
                "pg_gatherer_interval_seconds",
                "Configured gathering interval",
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.runs_total.clone()))?;
        registry.register(Box::new(self.failures_total.clone()))?;
        registry.register(Box::new(self.run_duration_seconds.clone()))?;
        registry.register(Box::new(self.last_run_timestamp.clone()))?;
        registry.register(Box::new(self.last_run_success.clone()))?;
        registry.register(Box::new(self.samples_read_total.clone()))?;
        registry.register(Box::new(self.samples_written_total.clone()))?;
        registry.register(Box::new(self.scheduled.clone()))?;
        registry.register(Box::new(self.interval_seconds.clone()))?;
        Ok(())
    }
}

/// Process-wide record of every gatherer and the outcome of its last tick.
///
/// Clones share state. Passed into the schedulers and gatherers rather
/// than reached through a global, so tests get their own instance.
///
/// Uses `std::sync::RwLock`: readers are the status endpoints, writers are
/// ticks and settings changes, and no lock is held across an await. A
/// poisoned lock is recovered so one panicking tick cannot blind the
/// status surface.
#[derive(Clone)]
pub struct GathererRegistry {
    state: Arc<RwLock<BTreeMap<GathererKey, GathererStatus>>>,
    metrics: GathererMetrics,
}

impl Default for GathererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GathererRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BTreeMap::new())),
            metrics: GathererMetrics::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<GathererKey, GathererStatus>> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("gatherer registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<GathererKey, GathererStatus>> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("gatherer registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Upsert a gatherer's identity and schedule. Tick history is kept.
    pub fn register(&self, key: GathererKey, host: &str, interval: Duration, scheduled: bool) {
        let interval_seconds = interval.as_secs();
        let labels = [host, key.kind.as_str()];

        self.metrics
            .scheduled
            .with_label_values(&labels)
            .set(i64::from(scheduled));
        self.metrics
            .interval_seconds
            .with_label_values(&labels)
            .set(i64::try_from(interval_seconds).unwrap_or(i64::MAX));

        let mut state = self.write();
        let status = state
            .entry(key)
            .or_insert_with(|| GathererStatus::new(key, host));
        status.host = host.to_string();
        status.interval_seconds = interval_seconds;
        status.scheduled = scheduled;
    }

    /// Store the outcome of one tick.
    pub fn record(&self, key: GathererKey, host: &str, report: &TickReport) {
        let labels = [host, key.kind.as_str()];

        self.metrics.runs_total.with_label_values(&labels).inc();
        self.metrics
            .run_duration_seconds
            .with_label_values(&labels)
            .observe(report.elapsed.as_secs_f64());
        #[allow(clippy::cast_precision_loss)]
        self.metrics
            .last_run_timestamp
            .with_label_values(&labels)
            .set(report.started_at.timestamp_millis() as f64 / 1000.0);

        match &report.result {
            Ok(stats) => {
                self.metrics.last_run_success.with_label_values(&labels).set(1.0);
                self.metrics
                    .samples_read_total
                    .with_label_values(&labels)
                    .inc_by(stats.read as u64);
                self.metrics
                    .samples_written_total
                    .with_label_values(&labels)
                    .inc_by(stats.written as u64);
            }
            Err(_) => {
                self.metrics.last_run_success.with_label_values(&labels).set(0.0);
                self.metrics.failures_total.with_label_values(&labels).inc();
            }
        }

        let mut state = self.write();
        let status = state
            .entry(key)
            .or_insert_with(|| GathererStatus::new(key, host));

        status.runs += 1;
        status.last_run = Some(report.started_at);
        status.last_duration_ms = Some(u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX));
        match &report.result {
            Ok(stats) => {
                status.last_success = Some(true);
                status.last_error = None;
                status.last_stats = Some(*stats);
            }
            Err(message) => {
                status.failures += 1;
                status.last_success = Some(false);
                status.last_error = Some(message.clone());
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: GathererKey) -> Option<GathererStatus> {
        self.read().get(&key).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<GathererStatus> {
        self.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Register the prometheus side of the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric is already registered in `registry`.
    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.metrics.register(registry)
    }
}
