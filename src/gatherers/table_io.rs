use super::{Dimension, DimensionKind, Measurement, MetricGatherer};
use crate::backend::Record;
use crate::hosts::MetricKind;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Heap and index block reads vs. buffer hits per user table.
pub type TableIoGatherer<B> = MetricGatherer<TableIoSample, B>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableIoSample {
    pub schema: String,
    pub name: String,
    pub heap_read: i64,
    pub heap_hit: i64,
    pub index_read: i64,
    pub index_hit: i64,
}

const QUERY: &str = r"
SELECT
    schemaname AS schema_name,
    relname AS table_name,
    COALESCE(heap_blks_read, 0)::bigint AS heap_read,
    COALESCE(heap_blks_hit, 0)::bigint AS heap_hit,
    COALESCE(idx_blks_read, 0)::bigint AS index_read,
    COALESCE(idx_blks_hit, 0)::bigint AS index_hit
FROM pg_statio_user_tables
WHERE NOT schemaname LIKE ANY (ARRAY['pg%', 'information_schema'])
";

impl Measurement for TableIoSample {
    const KIND: MetricKind = MetricKind::TableIo;
    const QUERY: &'static str = QUERY;

    type Counter = [i64; 4];

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            schema: row.try_get("schema_name")?,
            name: row.try_get("table_name")?,
            heap_read: row.try_get("heap_read")?,
            heap_hit: row.try_get("heap_hit")?,
            index_read: row.try_get("index_read")?,
            index_hit: row.try_get("index_hit")?,
        })
    }

    fn dimension(&self) -> Option<Dimension<'_>> {
        Some(Dimension::new(DimensionKind::Table, &self.schema, &self.name))
    }

    fn counter(&self) -> Option<[i64; 4]> {
        Some([self.heap_read, self.heap_hit, self.index_read, self.index_hit])
    }

    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record {
        Record::TableIo {
            timestamp: captured_at,
            table_id: id,
            heap_read: self.heap_read,
            heap_hit: self.heap_hit,
            index_read: self.index_read,
            index_hit: self.index_hit,
        }
    }
}
