//! Where samples come from and where they go.
//!
//! A [`Backend`] reads one snapshot of a measurement from a monitored host
//! over a short-lived direct connection, and lends out sink sessions backed
//! by the shared pool. Gatherers are generic over it so the dedup logic can
//! run against an in-memory backend in tests.

use crate::gatherers::{Dimension, Measurement};
use crate::hosts::HostTarget;
use anyhow::Result;
use chrono::{DateTime, Utc};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::{PgBackend, PgSession, SourceOptions};

pub trait Backend: Send + Sync + 'static {
    type Session: SinkSession;

    /// Read every row of `M` from `target`, closing the connection before returning.
    fn fetch<M: Measurement>(
        &self,
        target: &HostTarget,
    ) -> impl Future<Output = Result<Vec<M>>> + Send;

    /// Borrow one sink connection for a write phase.
    fn session(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// One pooled sink connection, released when dropped.
pub trait SinkSession: Send {
    /// Look up, or insert, the stable id of a monitored object.
    fn resolve_dimension(
        &mut self,
        host_id: i32,
        dimension: Dimension<'_>,
    ) -> impl Future<Output = Result<i32>> + Send;

    /// Write all records in one transaction: either every row lands or none does.
    fn write_batch(&mut self, records: &[Record]) -> impl Future<Output = Result<()>> + Send;
}

/// A time series row bound for the sink.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Sproc {
        timestamp: DateTime<Utc>,
        sproc_id: i32,
        calls: i64,
        total_time: i64,
        self_time: i64,
    },
    TableStats {
        timestamp: DateTime<Utc>,
        table_id: i32,
        table_size: i64,
        index_size: i64,
        seq_scans: i64,
        index_scans: i64,
        tup_inserted: i64,
        tup_updated: i64,
        tup_deleted: i64,
        tup_hot_updated: i64,
    },
    TableIo {
        timestamp: DateTime<Utc>,
        table_id: i32,
        heap_read: i64,
        heap_hit: i64,
        index_read: i64,
        index_hit: i64,
    },
    Load {
        timestamp: DateTime<Utc>,
        host_id: i32,
        load_1min: f64,
        load_5min: f64,
        load_15min: f64,
    },
}

impl Record {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Sproc { timestamp, .. }
            | Self::TableStats { timestamp, .. }
            | Self::TableIo { timestamp, .. }
            | Self::Load { timestamp, .. } => *timestamp,
        }
    }
}
