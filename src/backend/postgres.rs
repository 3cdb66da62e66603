use super::{Backend, Record, SinkSession};
use crate::gatherers::{Dimension, DimensionKind, Measurement};
use crate::hosts::HostTarget;
use anyhow::{Context, Result, anyhow};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info_span, warn};
use tracing_futures::Instrument as _;

/// Limits applied to every monitored-host connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceOptions {
    /// `statement_timeout` set on the session, so one slow host cannot hold
    /// its executor indefinitely.
    pub statement_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Reads from monitored hosts over direct connections and writes to the
/// sink through a shared pool.
#[derive(Clone, Debug)]
pub struct PgBackend {
    pool: PgPool,
    options: SourceOptions,
}

impl PgBackend {
    #[must_use]
    pub const fn new(pool: PgPool, options: SourceOptions) -> Self {
        Self { pool, options }
    }
}

impl Backend for PgBackend {
    type Session = PgSession;

    async fn fetch<M: Measurement>(&self, target: &HostTarget) -> Result<Vec<M>> {
        let options = target.connect_options().options([(
            "statement_timeout",
            format!("{}ms", self.options.statement_timeout.as_millis()),
        )]);

        let mut conn = timeout(self.options.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                anyhow!(
                    "timed out after {:?} connecting to {target}",
                    self.options.connect_timeout
                )
            })?
            .with_context(|| format!("failed to connect to {target}"))?;

        let query_span = info_span!(
            "db.query",
            otel.kind = "client",
            db.system = "postgresql",
            db.operation = "SELECT",
            gatherer = %M::KIND,
            host = %target,
        );

        let rows = sqlx::query(M::QUERY)
            .fetch_all(&mut conn)
            .instrument(query_span)
            .await;

        // Done with the host before the write phase starts.
        if let Err(e) = conn.close().await {
            warn!(host = %target, error = %e, "failed to close monitored host connection");
        }

        let rows = rows.with_context(|| format!("{} query failed on {target}", M::KIND))?;

        debug!(host = %target, gatherer = %M::KIND, rows = rows.len(), "fetched rows");

        rows.iter()
            .map(M::from_row)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to decode {} row from {target}", M::KIND))
    }

    async fn session(&self) -> Result<PgSession> {
        let conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire sink connection")?;

        Ok(PgSession { conn })
    }
}

pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl SinkSession for PgSession {
    async fn resolve_dimension(&mut self, host_id: i32, dimension: Dimension<'_>) -> Result<i32> {
        let (select, upsert) = dimension_queries(dimension.kind);

        let existing: Option<i32> = sqlx::query_scalar(select)
            .bind(host_id)
            .bind(dimension.schema)
            .bind(dimension.name)
            .fetch_optional(&mut *self.conn)
            .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let id: i32 = sqlx::query_scalar(upsert)
            .bind(host_id)
            .bind(dimension.schema)
            .bind(dimension.name)
            .fetch_one(&mut *self.conn)
            .await?;

        debug!(
            host_id,
            schema = dimension.schema,
            name = dimension.name,
            id,
            "registered new dimension"
        );

        Ok(id)
    }

    async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.conn.begin().await?;

        for record in records {
            insert_record(&mut tx, record).await?;
        }

        tx.commit().await?;

        Ok(())
    }
}

const fn dimension_queries(kind: DimensionKind) -> (&'static str, &'static str) {
    match kind {
        DimensionKind::Sproc => (
            r"
            SELECT sproc_id FROM sproc_dimension
            WHERE host_id = $1 AND schema_name = $2 AND function_name = $3
            ",
            r"
            INSERT INTO sproc_dimension (host_id, schema_name, function_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (host_id, schema_name, function_name)
                DO UPDATE SET function_name = EXCLUDED.function_name
            RETURNING sproc_id
            ",
        ),
        DimensionKind::Table => (
            r"
            SELECT table_id FROM table_dimension
            WHERE host_id = $1 AND schema_name = $2 AND table_name = $3
            ",
            r"
            INSERT INTO table_dimension (host_id, schema_name, table_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (host_id, schema_name, table_name)
                DO UPDATE SET table_name = EXCLUDED.table_name
            RETURNING table_id
            ",
        ),
    }
}

async fn insert_record(conn: &mut PgConnection, record: &Record) -> Result<()> {
    match record {
        Record::Sproc {
            timestamp,
            sproc_id,
            calls,
            total_time,
            self_time,
        } => {
            sqlx::query(
                r"
                INSERT INTO sproc_performance_data
                    (sp_timestamp, sp_sproc_id, sp_calls, sp_total_time, sp_self_time)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(timestamp)
            .bind(sproc_id)
            .bind(calls)
            .bind(total_time)
            .bind(self_time)
            .execute(conn)
            .await?;
        }
        Record::TableStats {
            timestamp,
            table_id,
            table_size,
            index_size,
            seq_scans,
            index_scans,
            tup_inserted,
            tup_updated,
            tup_deleted,
            tup_hot_updated,
        } => {
            sqlx::query(
                r"
                INSERT INTO table_size_data
                    (tsd_timestamp, tsd_table_id, tsd_table_size, tsd_index_size,
                     tsd_seq_scans, tsd_index_scans, tsd_tup_ins, tsd_tup_upd,
                     tsd_tup_del, tsd_tup_hot_upd)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ",
            )
            .bind(timestamp)
            .bind(table_id)
            .bind(table_size)
            .bind(index_size)
            .bind(seq_scans)
            .bind(index_scans)
            .bind(tup_inserted)
            .bind(tup_updated)
            .bind(tup_deleted)
            .bind(tup_hot_updated)
            .execute(conn)
            .await?;
        }
        Record::TableIo {
            timestamp,
            table_id,
            heap_read,
            heap_hit,
            index_read,
            index_hit,
        } => {
            sqlx::query(
                r"
                INSERT INTO table_io_data
                    (tio_timestamp, tio_table_id, tio_heap_read, tio_heap_hit,
                     tio_idx_read, tio_idx_hit)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(timestamp)
            .bind(table_id)
            .bind(heap_read)
            .bind(heap_hit)
            .bind(index_read)
            .bind(index_hit)
            .execute(conn)
            .await?;
        }
        Record::Load {
            timestamp,
            host_id,
            load_1min,
            load_5min,
            load_15min,
        } => {
            sqlx::query(
                r"
                INSERT INTO host_load
                    (load_host_id, load_timestamp, load_1min_value, load_5min_value, load_15min_value)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(host_id)
            .bind(timestamp)
            .bind(load_1min)
            .bind(load_5min)
            .bind(load_15min)
            .execute(conn)
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_options_default() {
        let options = SourceOptions::default();
        assert_eq!(options.statement_timeout, Duration::from_secs(15));
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_dimension_queries_target_matching_tables() {
        let (select, upsert) = dimension_queries(DimensionKind::Sproc);
        assert!(select.contains("sproc_dimension"));
        assert!(upsert.contains("RETURNING sproc_id"));

        let (select, upsert) = dimension_queries(DimensionKind::Table);
        assert!(select.contains("table_dimension"));
        assert!(upsert.contains("RETURNING table_id"));
    }
}
