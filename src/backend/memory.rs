//! In-memory backend for unit tests: scripted host snapshots, captured sink writes.

use super::{Backend, Record, SinkSession};
use crate::gatherers::{Dimension, DimensionKind, Measurement};
use crate::hosts::{HostTarget, MetricKind};
use anyhow::{Result, anyhow};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Snapshot = Result<Box<dyn Any + Send>, String>;

#[derive(Default)]
struct Inner {
    snapshots: Mutex<HashMap<MetricKind, VecDeque<Snapshot>>>,
    dimensions: Mutex<HashMap<(DimensionKind, i32, String, String), i32>>,
    refused: Mutex<HashSet<String>>,
    records: Mutex<Vec<Record>>,
    failing_writes: AtomicUsize,
    fetches: AtomicUsize,
    lookups: AtomicUsize,
    batches: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows the next fetch of `M` returns. An empty queue yields no rows.
    pub fn push_snapshot<M: Measurement>(&self, samples: Vec<M>) {
        lock(&self.inner.snapshots)
            .entry(M::KIND)
            .or_default()
            .push_back(Ok(Box::new(samples)));
    }

    pub fn push_fetch_error(&self, kind: MetricKind, message: &str) {
        lock(&self.inner.snapshots)
            .entry(kind)
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Make the next `n` batch writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn refuse_dimension(&self, name: &str) {
        lock(&self.inner.refused).insert(name.to_string());
    }

    pub fn allow_dimension(&self, name: &str) {
        lock(&self.inner.refused).remove(name);
    }

    pub fn records(&self) -> Vec<Record> {
        lock(&self.inner.records).clone()
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn dimension_lookups(&self) -> usize {
        self.inner.lookups.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> usize {
        self.inner.batches.load(Ordering::SeqCst)
    }
}

impl Backend for MemoryBackend {
    type Session = MemorySession;

    async fn fetch<M: Measurement>(&self, target: &HostTarget) -> Result<Vec<M>> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);

        let next = lock(&self.inner.snapshots)
            .get_mut(&M::KIND)
            .and_then(VecDeque::pop_front);

        match next {
            None => Ok(Vec::new()),
            Some(Err(message)) => Err(anyhow!("{message} ({target})")),
            Some(Ok(boxed)) => boxed
                .downcast::<Vec<M>>()
                .map(|samples| *samples)
                .map_err(|_| anyhow!("snapshot queued for {} has the wrong type", M::KIND)),
        }
    }

    async fn session(&self) -> Result<MemorySession> {
        Ok(MemorySession {
            inner: Arc::clone(&self.inner),
        })
    }
}

pub struct MemorySession {
    inner: Arc<Inner>,
}

impl SinkSession for MemorySession {
    async fn resolve_dimension(&mut self, host_id: i32, dimension: Dimension<'_>) -> Result<i32> {
        self.inner.lookups.fetch_add(1, Ordering::SeqCst);

        if lock(&self.inner.refused).contains(dimension.name) {
            return Err(anyhow!("lookup of {} refused", dimension.name));
        }

        let mut dimensions = lock(&self.inner.dimensions);
        let next = i32::try_from(dimensions.len())? + 1;
        let id = *dimensions
            .entry((
                dimension.kind,
                host_id,
                dimension.schema.to_string(),
                dimension.name.to_string(),
            ))
            .or_insert(next);

        Ok(id)
    }

    async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        self.inner.batches.fetch_add(1, Ordering::SeqCst);

        let failing = self.inner.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.inner.failing_writes.store(failing - 1, Ordering::SeqCst);
            return Err(anyhow!("sink write failed"));
        }

        lock(&self.inner.records).extend_from_slice(records);
        Ok(())
    }
}
