use super::{Dimension, DimensionKind, Measurement, MetricGatherer};
use crate::backend::Record;
use crate::hosts::MetricKind;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Stored procedure call counters, deduplicated on the number of calls.
pub type SprocGatherer<B> = MetricGatherer<SprocSample, B>;

/// Cumulative call and time counters of one function since stats were last reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SprocSample {
    pub schema: String,
    /// Function name with its normalized argument types, e.g. `get_order(integer)`.
    pub name: String,
    pub calls: i64,
    /// Milliseconds, fractions truncated (as is `self_time`).
    pub total_time: i64,
    pub self_time: i64,
}

// Only the newest `<name>_api` schema of each API family counts, plus every
// `<name>_data` schema. Argument names and OUT markers are stripped from the
// identity arguments so that redeploying a function with renamed parameters
// keeps its dimension id.
const QUERY: &str = r"
SELECT
    schemaname AS schema_name,
    funcname || '(' ||
        regexp_replace(
            regexp_replace(
                regexp_replace(pg_get_function_identity_arguments(funcid)::text, '\s*OUT\s*', '', 'g'),
                '^[A-Za-z_0-9]+\s*|(,)\s*[A-Za-z_0-9]+', '\1', 'g'),
            '[a-z_0-9]+\.', '', 'g')
        || ')' AS function_name,
    calls,
    trunc(self_time)::bigint AS self_time,
    trunc(total_time)::bigint AS total_time
FROM pg_stat_user_functions
WHERE NOT schemaname LIKE ANY (ARRAY['pg%', 'information_schema'])
  AND (
    schemaname IN (
        SELECT name FROM (
            SELECT nspname,
                   rank() OVER (PARTITION BY substring(nspname FROM '(.*)_api') ORDER BY nspname DESC)
            FROM pg_namespace
            WHERE nspname LIKE '%_api%'
        ) apis (name, rank)
        WHERE rank = 1
    )
    OR schemaname LIKE '%_data'
  )
";

impl Measurement for SprocSample {
    const KIND: MetricKind = MetricKind::Sproc;
    const QUERY: &'static str = QUERY;

    type Counter = i64;

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            schema: row.try_get("schema_name")?,
            name: row.try_get("function_name")?,
            calls: row.try_get("calls")?,
            total_time: row.try_get("total_time")?,
            self_time: row.try_get("self_time")?,
        })
    }

    fn dimension(&self) -> Option<Dimension<'_>> {
        Some(Dimension::new(DimensionKind::Sproc, &self.schema, &self.name))
    }

    fn counter(&self) -> Option<i64> {
        Some(self.calls)
    }

    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record {
        Record::Sproc {
            timestamp: captured_at,
            sproc_id: id,
            calls: self.calls,
            total_time: self.total_time,
            self_time: self.self_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(calls: i64) -> SprocSample {
        SprocSample {
            schema: "shop_api".to_string(),
            name: "get_order(integer)".to_string(),
            calls,
            total_time: 120,
            self_time: 80,
        }
    }

    #[test]
    fn test_counter_is_call_count_only() {
        let a = sample(10);
        let mut b = sample(10);
        b.total_time = 999;

        assert_eq!(a.counter(), b.counter(), "time alone does not make a sample new");
    }

    #[test]
    fn test_record_carries_all_values() {
        let now = Utc::now();
        let record = sample(10).record(now, 42);

        assert_eq!(
            record,
            Record::Sproc {
                timestamp: now,
                sproc_id: 42,
                calls: 10,
                total_time: 120,
                self_time: 80,
            }
        );
    }

    #[test]
    fn test_query_filters_schemas() {
        assert!(QUERY.contains("pg_stat_user_functions"));
        assert!(QUERY.contains("'%_data'"));
        assert!(QUERY.contains("rank = 1"));
    }

    #[test]
    fn test_query_truncates_times() {
        assert!(QUERY.contains("trunc(self_time)::bigint"));
        assert!(QUERY.contains("trunc(total_time)::bigint"));
    }
}
