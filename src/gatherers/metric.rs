use super::{
    DimensionCache, GatherStats, Gatherer, GathererKey, GathererRegistry, Measurement, TickReport,
};
use crate::backend::{Backend, SinkSession};
use crate::hosts::{HostTarget, MetricKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span};
use tracing_futures::Instrument as _;

/// Buffers snapshots of one measurement and writes only the samples whose
/// cumulative counter moved since the last committed write.
///
/// Owned by exactly one scheduled task, so none of its state needs locking.
/// Unscheduling keeps the gatherer (and with it the dimension cache, the
/// last-seen counters and any unflushed samples) alive.
pub struct MetricGatherer<M: Measurement, B: Backend> {
    target: Arc<HostTarget>,
    backend: Arc<B>,
    registry: GathererRegistry,
    ids: DimensionCache,
    last_seen: HashMap<i32, M::Counter>,
    buffer: BTreeMap<DateTime<Utc>, Vec<M>>,
}

impl<M: Measurement, B: Backend> MetricGatherer<M, B> {
    #[must_use]
    pub fn new(target: Arc<HostTarget>, backend: Arc<B>, registry: GathererRegistry) -> Self {
        Self {
            target,
            backend,
            registry,
            ids: DimensionCache::new(),
            last_seen: HashMap::new(),
            buffer: BTreeMap::new(),
        }
    }

    /// Samples waiting for a successful flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.values().map(Vec::len).sum()
    }

    /// Distinct capture timestamps waiting for a successful flush.
    #[must_use]
    pub fn buffered_snapshots(&self) -> usize {
        self.buffer.len()
    }

    /// Counter last written for dimension `id`.
    #[must_use]
    pub fn last_seen(&self, id: i32) -> Option<&M::Counter> {
        self.last_seen.get(&id)
    }

    #[must_use]
    pub const fn dimension_ids(&self) -> &DimensionCache {
        &self.ids
    }

    /// Read one snapshot from the monitored host into the buffer.
    ///
    /// Every row of the snapshot is stamped with the wall-clock time taken
    /// before the query started.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be reached or the query fails;
    /// the buffer is left as it was.
    pub async fn read(&mut self) -> Result<usize> {
        let captured_at = Utc::now();
        let samples = self.backend.fetch::<M>(&self.target).await?;
        let count = samples.len();

        if !samples.is_empty() {
            self.buffer.entry(captured_at).or_default().extend(samples);
        }

        Ok(count)
    }

    /// Write every buffered sample that carries new information.
    ///
    /// Ids are resolved first, outside the write transaction, so a rollback
    /// never leaves ids cached that the sink does not have. Last-seen
    /// counters advance and the buffer is cleared only after the batch
    /// commits; on any error both stay untouched and the next flush
    /// re-evaluates the same samples.
    ///
    /// # Errors
    ///
    /// Returns an error if no sink connection is available or the batch
    /// cannot be written.
    pub async fn flush(&mut self) -> Result<GatherStats> {
        let mut stats = GatherStats::default();

        if self.buffer.is_empty() {
            return Ok(stats);
        }

        let host_id = self.target.id;
        let mut session = self.backend.session().await?;
        let mut pending: HashMap<i32, M::Counter> = HashMap::new();
        let mut records = Vec::new();

        for (captured_at, samples) in &self.buffer {
            for sample in samples {
                stats.read += 1;

                let id = match sample.dimension() {
                    None => host_id,
                    Some(dimension) => {
                        match self.ids.resolve(&mut session, host_id, dimension).await {
                            Some(id) => id,
                            None => {
                                stats.unresolved += 1;
                                continue;
                            }
                        }
                    }
                };

                if let Some(counter) = sample.counter() {
                    let previous = pending.get(&id).or_else(|| self.last_seen.get(&id));
                    if previous == Some(&counter) {
                        stats.unchanged += 1;
                        continue;
                    }
                    pending.insert(id, counter);
                }

                records.push(sample.record(*captured_at, id));
            }
        }

        session
            .write_batch(&records)
            .await
            .with_context(|| format!("failed to write {} {} rows", records.len(), M::KIND))?;

        stats.written = records.len();
        self.last_seen.extend(pending);
        self.buffer.clear();

        Ok(stats)
    }

    /// One full tick: read a snapshot, then flush everything buffered.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error.
    pub async fn gather(&mut self) -> Result<GatherStats> {
        let fetched = self.read().await?;

        debug!(
            host = %self.target,
            gatherer = %M::KIND,
            fetched,
            buffered = self.buffered(),
            snapshots = self.buffered_snapshots(),
            "snapshot buffered"
        );

        self.flush().await
    }
}

impl<M: Measurement, B: Backend> Gatherer for MetricGatherer<M, B> {
    fn kind(&self) -> MetricKind {
        M::KIND
    }

    async fn gather_data(&mut self) -> bool {
        let started_at = Utc::now();
        let start = Instant::now();
        let span = info_span!("gather", host = %self.target, gatherer = M::KIND.as_str());

        let result = self.gather().instrument(span).await;
        let elapsed = start.elapsed();

        let result = match result {
            Ok(stats) => {
                info!(
                    host = %self.target,
                    gatherer = %M::KIND,
                    read = stats.read,
                    written = stats.written,
                    unchanged = stats.unchanged,
                    unresolved = stats.unresolved,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "tick complete"
                );
                Ok(stats)
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(
                    host = %self.target,
                    gatherer = %M::KIND,
                    error = %message,
                    buffered = self.buffered(),
                    "tick failed"
                );
                Err(message)
            }
        };

        let success = result.is_ok();
        self.registry.record(
            GathererKey::new(self.target.id, M::KIND),
            &self.target.to_string(),
            &TickReport {
                started_at,
                elapsed,
                result,
            },
        );

        success
    }
}
