use super::{Dimension, Measurement, MetricGatherer};
use crate::backend::Record;
use crate::hosts::MetricKind;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Operating system load average of the monitored host.
pub type LoadGatherer<B> = MetricGatherer<LoadSample, B>;

#[derive(Clone, Debug, PartialEq)]
pub struct LoadSample {
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
}

// Needs superuser or pg_read_server_files on the monitored host.
const QUERY: &str = r"
WITH loadavg AS (
    SELECT string_to_array(pg_read_file('/proc/loadavg'), ' ') AS fields
)
SELECT
    fields[1]::double precision AS load_1min,
    fields[2]::double precision AS load_5min,
    fields[3]::double precision AS load_15min
FROM loadavg
";

impl Measurement for LoadSample {
    const KIND: MetricKind = MetricKind::Load;
    const QUERY: &'static str = QUERY;

    type Counter = ();

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            load_1min: row.try_get("load_1min")?,
            load_5min: row.try_get("load_5min")?,
            load_15min: row.try_get("load_15min")?,
        })
    }

    fn dimension(&self) -> Option<Dimension<'_>> {
        None
    }

    // A gauge, not a cumulative counter.
    fn counter(&self) -> Option<()> {
        None
    }

    fn record(&self, captured_at: DateTime<Utc>, id: i32) -> Record {
        Record::Load {
            timestamp: captured_at,
            host_id: id,
            load_1min: self.load_1min,
            load_5min: self.load_5min,
            load_15min: self.load_15min,
        }
    }
}
