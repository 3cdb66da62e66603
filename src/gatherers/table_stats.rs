use super::{Dimension, DimensionKind, Measurement, MetricGatherer};
use crate::backend::Record;
use crate::hosts::MetricKind;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Table and index sizes plus scan/tuple activity per user table.
pub type TableStatsGatherer<B> = MetricGatherer<TableStatsSample, B>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableStatsSample {
    pub schema: String,
    pub name: String,
    pub table_size: i64,
    pub index_size: i64,
    pub seq_scans: i64,
    pub index_scans: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub tup_hot_updated: i64,
}

const QUERY: &str = r"
SELECT
    schemaname AS schema_name,
    relname AS table_name,
    COALESCE(pg_table_size(relid), 0)::bigint AS table_size,
    COALESCE(pg_indexes_size(relid), 0)::bigint AS index_size,
    COALESCE(seq_scan, 0)::bigint AS seq_scans,
    COALESCE(idx_scan, 0)::bigint AS index_scans,
    COALESCE(n_tup_ins, 0)::bigint AS tup_inserted,
    COALESCE(n_tup_upd, 0)::bigint AS tup_updated,
    COALESCE(n_tup_del, 0)::bigint AS tup_deleted,
    COALESCE(n_tup_hot_upd, 0)::bigint AS tup_hot_updated
FROM pg_stat_user_tables
WHERE NOT schemaname LIKE ANY (ARRAY['pg%', 'information_schema'])
";

impl Measurement for TableStatsSample {
    const KIND: MetricKind = MetricKind::TableStats;
    const QUERY: &'static str = QUERY;

    // Sizes can change without any scan or tuple activity (vacuum, bloat),
    // so all of them decide together.
    type Counter = [i64; 8];

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            schema: row.try_get("schema_name")?,
            name: row.try_get("table_name")?,
            table_size: row.try_get("table_size")?,
            index_size: row.try_get("index_size")?,
            seq_scans: row.try_get("seq_scans")?,
            index_scans: row.try_get("index_scans")?,
            tup_inserted: row.try_get("tup_inserted")?,
            tup_updated: row.try_get("tup_updated")?,
            tup_deleted: row.try_get("tup_deleted")?,
            tup_hot_updated: row.try_get("tup_hot_updated")?,
        })
    }

    fn dimension(&self) -> Option<Dimension<'_>> {
        Some(Dimension::new(DimensionKind::Table, &self.schema, &self.name))
    }

    fn counter(&self) -> Option<[i64; 8]> {
        Some([
            self.table_size,
            self.index_size,
            self.seq_scans,
            self.index_scans,
            self.tup_inserted,
            self.tup_updated,
            self.tup_deleted,
            self.tup_hot_updated,
        ])
    }

    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record {
        Record::TableStats {
            timestamp: captured_at,
            table_id: id,
            table_size: self.table_size,
            index_size: self.index_size,
            seq_scans: self.seq_scans,
            index_scans: self.index_scans,
            tup_inserted: self.tup_inserted,
            tup_updated: self.tup_updated,
            tup_deleted: self.tup_deleted,
            tup_hot_updated: self.tup_hot_updated,
        }
    }
}
