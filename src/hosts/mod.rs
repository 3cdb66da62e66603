//! Monitored hosts as registered in the sink's `hosts` table.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error, warn};

pub mod settings;

pub use settings::{GatherSetting, MetricKind, Settings};

/// Connection parameters of one monitored host.
///
/// Gatherers hold this behind an `Arc`; it is never modified after the
/// host has been loaded.
#[derive(Debug)]
pub struct HostTarget {
    pub id: i32,
    pub name: String,
    pub port: u16,
    pub user: String,
    password: SecretString,
    pub dbname: String,
}

impl HostTarget {
    #[must_use]
    pub fn new(
        id: i32,
        name: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: SecretString,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            port,
            user: user.into(),
            password,
            dbname: dbname.into(),
        }
    }

    /// Options for a direct (unpooled) connection to this host.
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.name)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.dbname)
            .application_name(env!("CARGO_PKG_NAME"))
    }

    /// True when both targets point at the same database with the same credentials.
    #[must_use]
    pub fn same_endpoint(&self, other: &Self) -> bool {
        self.name == other.name
            && self.port == other.port
            && self.user == other.user
            && self.dbname == other.dbname
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.dbname)
    }
}

/// A registry entry: where to connect and what to gather.
#[derive(Debug)]
pub struct Host {
    pub target: HostTarget,
    pub settings: Settings,
}

/// Raw `hosts` row before validation.
#[derive(Debug, Clone)]
pub struct HostRow {
    pub host_id: i32,
    pub host_name: String,
    pub host_port: i32,
    pub host_user: String,
    pub host_password: Option<String>,
    pub host_db: String,
    pub host_settings: Option<String>,
}

impl HostRow {
    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            host_id: row.try_get("host_id")?,
            host_name: row.try_get("host_name")?,
            host_port: row.try_get("host_port")?,
            host_user: row.try_get("host_user")?,
            host_password: row.try_get("host_password")?,
            host_db: row.try_get("host_db")?,
            host_settings: row.try_get("host_settings")?,
        })
    }
}

/// Parse a stored settings blob, falling back to defaults when it is absent or broken.
#[must_use]
pub fn parse_settings(host: &str, raw: Option<&str>) -> Settings {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            debug!(host, "no settings stored, using defaults");
            Settings::default()
        }
        Some(raw) => Settings::from_json(raw).unwrap_or_else(|e| {
            error!(host, error = %e, "could not deserialize settings, using defaults");
            Settings::default()
        }),
    }
}

/// Validate raw rows into hosts keyed by id.
///
/// Rows with a non-positive id or an out of range port are dropped; a
/// broken settings blob only affects its own host.
#[must_use]
pub fn hosts_from_rows(rows: Vec<HostRow>) -> BTreeMap<i32, Host> {
    let mut hosts = BTreeMap::new();

    for row in rows {
        if row.host_id <= 0 {
            warn!(host_id = row.host_id, host = %row.host_name, "skipping host with non-positive id");
            continue;
        }

        let Ok(port) = u16::try_from(row.host_port) else {
            warn!(host_id = row.host_id, port = row.host_port, "skipping host with invalid port");
            continue;
        };

        let target = HostTarget::new(
            row.host_id,
            row.host_name,
            port,
            row.host_user,
            SecretString::from(row.host_password.unwrap_or_default()),
            row.host_db,
        );
        let settings = parse_settings(&target.to_string(), row.host_settings.as_deref());

        hosts.insert(row.host_id, Host { target, settings });
    }

    hosts
}

/// Load every enabled host from the sink.
///
/// # Errors
///
/// Returns an error if the `hosts` table cannot be queried.
pub async fn load_all_hosts(pool: &PgPool) -> Result<BTreeMap<i32, Host>> {
    let rows = sqlx::query(
        r"
        SELECT host_id, host_name, host_port, host_user, host_password, host_db, host_settings
        FROM hosts
        WHERE host_enabled
        ORDER BY host_id
        ",
    )
    .fetch_all(pool)
    .await
    .context("failed to query hosts")?;

    let rows = rows
        .iter()
        .map(HostRow::from_pg_row)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to decode hosts row")?;

    Ok(hosts_from_rows(rows))
}
