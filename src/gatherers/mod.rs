use crate::backend::{Backend, Record};
use crate::hosts::{HostTarget, MetricKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use std::fmt;
use std::sync::Arc;

#[macro_use]
mod register_macro;

pub mod dimension;
pub mod metric;
pub mod registry;

pub use dimension::{Dimension, DimensionCache, DimensionKind};
pub use metric::MetricGatherer;
pub use registry::{GathererKey, GathererRegistry, GathererStatus, TickReport};

/// A periodic unit of work bound to one host and one metric kind.
pub trait Gatherer: Send + 'static {
    fn kind(&self) -> MetricKind;

    /// Run one tick. Errors are logged and reported to the registry; the
    /// return value only says whether the tick succeeded.
    fn gather_data(&mut self) -> impl Future<Output = bool> + Send;
}

/// One row type read from a monitored host.
///
/// Implementors describe how to decode the row, which dimension it belongs
/// to, which value decides whether it is new, and what to write for it.
pub trait Measurement: Send + Sync + Sized + 'static {
    const KIND: MetricKind;

    /// Query run on the monitored host.
    const QUERY: &'static str;

    /// Cumulative value compared with the last one written for the same id.
    type Counter: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error if a column is missing or has an unexpected type.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;

    /// `None` for host-wide measurements.
    fn dimension(&self) -> Option<Dimension<'_>>;

    /// `None` when the value is not a cumulative counter and must always be written.
    fn counter(&self) -> Option<Self::Counter>;

    /// Sink row for this sample. `id` is the resolved dimension id, or the
    /// host id for host-wide measurements.
    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record;
}

/// What one flush did with the buffered samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GatherStats {
    pub read: usize,
    pub written: usize,
    pub unchanged: usize,
    pub unresolved: usize,
}

// Each metric kind maps to exactly one gatherer type.
register_gatherers! {
    Sproc => sproc::SprocGatherer,
    TableStats => table_stats::TableStatsGatherer,
    TableIo => table_io::TableIoGatherer,
    Load => load::LoadGatherer,
}
