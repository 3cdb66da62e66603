mod common;

use chrono::{DateTime, Utc};
use pg_gatherer::backend::{Backend, PgBackend, Record, SourceOptions};
use pg_gatherer::gatherers::{
    Dimension, Measurement, load::LoadSample, sproc::SprocSample, table_io::TableIoSample,
    table_stats::TableStatsSample,
};
use pg_gatherer::hosts::{HostTarget, MetricKind};
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgConnection, PgPool, Row};
use std::time::{Duration, Instant};
use ulid::Ulid;

/// `statement_timeout` as the monitored-host session sees it.
struct StatementTimeout {
    value: String,
}

impl Measurement for StatementTimeout {
    const KIND: MetricKind = MetricKind::Load;
    const QUERY: &'static str = "SELECT current_setting('statement_timeout') AS value";

    type Counter = ();

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            value: row.try_get("value")?,
        })
    }

    fn dimension(&self) -> Option<Dimension<'_>> {
        None
    }

    fn counter(&self) -> Option<()> {
        None
    }

    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record {
        Record::Load {
            timestamp: captured_at,
            host_id: id,
            load_1min: 0.0,
            load_5min: 0.0,
            load_15min: 0.0,
        }
    }
}

/// Runs longer than any statement timeout used here.
#[derive(Debug)]
struct SlowQuery;

impl Measurement for SlowQuery {
    const KIND: MetricKind = MetricKind::Load;
    const QUERY: &'static str = "SELECT pg_sleep(10)::text AS value";

    type Counter = ();

    fn from_row(_row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self)
    }

    fn dimension(&self) -> Option<Dimension<'_>> {
        None
    }

    fn counter(&self) -> Option<()> {
        None
    }

    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record {
        Record::Load {
            timestamp: captured_at,
            host_id: id,
            load_1min: 0.0,
            load_5min: 0.0,
            load_15min: 0.0,
        }
    }
}

fn backend(pool: PgPool, statement_timeout: Duration) -> PgBackend {
    PgBackend::new(
        pool,
        SourceOptions {
            statement_timeout,
            connect_timeout: Duration::from_secs(5),
        },
    )
}

// Runs in a session of its own that ends before polling, so its statistics get flushed.
async fn run_in_own_session(statements: &[String]) {
    let mut conn = PgConnection::connect(&common::get_test_dsn()).await.unwrap();
    for statement in statements {
        sqlx::raw_sql(statement).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
}

// Schemas starting with `pg` are never gathered, so sources get their own.
fn source_schema(suffix: &str) -> String {
    format!("t{}{suffix}", Ulid::new().to_string().to_lowercase())
}

/// Fetch `M` until `found` matches a sample or five seconds have passed.
async fn fetch_until<M, F>(backend: &PgBackend, target: &HostTarget, found: F) -> Option<M>
where
    M: Measurement,
    F: Fn(&M) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        let samples = backend.fetch::<M>(target).await.unwrap();
        if let Some(sample) = samples.into_iter().find(|s| found(s)) {
            return Some(sample);
        }
        if Instant::now() > deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[tokio::test]
async fn test_statement_timeout_is_set_on_source_session() {
    let Some(pool) = common::sink_pool().await.unwrap() else {
        return;
    };
    let backend = backend(pool, Duration::from_secs(3));
    let target = common::source_target(1).unwrap();

    let samples = backend.fetch::<StatementTimeout>(&target).await.unwrap();

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, "3s");
}

#[tokio::test]
async fn test_statement_timeout_cancels_slow_query() {
    let Some(pool) = common::sink_pool().await.unwrap() else {
        return;
    };
    let backend = backend(pool, Duration::from_secs(1));
    let target = common::source_target(1).unwrap();

    let started = Instant::now();
    let err = backend.fetch::<SlowQuery>(&target).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(
        format!("{err:#}").contains("statement timeout"),
        "{err:#}"
    );
}

#[tokio::test]
async fn test_sproc_query_normalizes_names_and_counts_calls() {
    let Some(pool) = common::sink_pool().await.unwrap() else {
        return;
    };
    let backend = backend(pool.clone(), Duration::from_secs(15));
    let target = common::source_target(1).unwrap();

    // One family of its own, so it is the newest `_api` schema of that family.
    let schema = source_schema("_api");
    sqlx::raw_sql(&format!(
        r"
        CREATE SCHEMA {schema};
        CREATE FUNCTION {schema}.get_order(order_id integer, OUT total numeric, OUT status text)
        LANGUAGE plpgsql AS $$ BEGIN total := order_id * 2; status := 'open'; END $$;
        "
    ))
    .execute(&pool)
    .await
    .unwrap();

    let mut conn = PgConnection::connect(&common::get_test_dsn()).await.unwrap();
    if sqlx::raw_sql("SET track_functions = 'all'")
        .execute(&mut conn)
        .await
        .is_err()
    {
        eprintln!("skipping: cannot enable track_functions (not a superuser)");
        return;
    }
    for id in 1..=3 {
        sqlx::raw_sql(&format!("SELECT * FROM {schema}.get_order({id})"))
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();

    let sample = fetch_until::<SprocSample, _>(&backend, &target, |s| {
        s.schema == schema && s.calls == 3
    })
    .await
    .expect("function statistics did not show up");

    assert_eq!(sample.name, "get_order(integer)");
    assert!(sample.self_time <= sample.total_time);

    let truncated: i64 = sqlx::query_scalar(
        "SELECT trunc(total_time)::bigint FROM pg_stat_user_functions WHERE schemaname = $1",
    )
    .bind(&schema)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(sample.total_time, truncated);

    sqlx::raw_sql(&format!("DROP SCHEMA {schema} CASCADE"))
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_table_queries_decode_activity() {
    let Some(pool) = common::sink_pool().await.unwrap() else {
        return;
    };
    let backend = backend(pool.clone(), Duration::from_secs(15));
    let target = common::source_target(1).unwrap();
    let schema = source_schema("_data");

    run_in_own_session(&[
        format!("CREATE SCHEMA {schema}"),
        format!("CREATE TABLE {schema}.orders (id integer PRIMARY KEY, note text)"),
        format!("INSERT INTO {schema}.orders SELECT g, 'n' FROM generate_series(1, 3) g"),
        format!("UPDATE {schema}.orders SET note = 'x' WHERE id = 1"),
        format!("SELECT * FROM {schema}.orders WHERE id = 2"),
    ])
    .await;

    let stats = fetch_until::<TableStatsSample, _>(&backend, &target, |s| {
        s.schema == schema && s.name == "orders" && s.tup_inserted == 3
    })
    .await
    .expect("table statistics did not show up");

    assert_eq!(stats.tup_updated, 1);
    assert_eq!(stats.tup_deleted, 0);
    assert!(stats.table_size > 0);
    assert!(stats.index_size > 0);

    let io = fetch_until::<TableIoSample, _>(&backend, &target, |s| {
        s.schema == schema && s.name == "orders" && s.heap_read + s.heap_hit > 0
    })
    .await
    .expect("table IO statistics did not show up");

    assert!(io.index_read + io.index_hit > 0);

    sqlx::raw_sql(&format!("DROP SCHEMA {schema} CASCADE"))
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_load_query_decodes_loadavg() {
    let Some(pool) = common::sink_pool().await.unwrap() else {
        return;
    };
    let backend = backend(pool, Duration::from_secs(15));
    let target = common::source_target(1).unwrap();

    // pg_read_file needs privileges and a Linux server.
    match backend.fetch::<LoadSample>(&target).await {
        Ok(samples) => {
            assert_eq!(samples.len(), 1);
            assert!(samples[0].load_1min >= 0.0);
            assert!(samples[0].load_15min >= 0.0);
        }
        Err(e) => eprintln!("skipping: load average not readable ({e:#})"),
    }
}
