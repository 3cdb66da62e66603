use serde::{Deserialize, Serialize};
use std::fmt;

/// Shortest cadence a gatherer may be scheduled at.
pub const MIN_INTERVAL_SECONDS: u64 = 1;

/// Longest cadence a gatherer may be scheduled at (one week).
pub const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// The four kinds of statistics gathered from every host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Sproc,
    TableStats,
    TableIo,
    Load,
}

impl MetricKind {
    pub const ALL: [Self; 4] = [Self::Sproc, Self::TableStats, Self::TableIo, Self::Load];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sproc => "sproc",
            Self::TableStats => "table_stats",
            Self::TableIo => "table_io",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enable flag and cadence for one metric kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatherSetting {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl GatherSetting {
    #[must_use]
    pub const fn enabled(interval_seconds: u64) -> Self {
        Self {
            enabled: true,
            interval_seconds,
        }
    }

    #[must_use]
    pub const fn disabled(interval_seconds: u64) -> Self {
        Self {
            enabled: false,
            interval_seconds,
        }
    }
}

/// Per-host gathering configuration, as stored in `hosts.host_settings`.
///
/// Values are never mutated once built: a reload produces a new `Settings`
/// and hands it to the scheduler by value, so a running tick never observes
/// a half-applied change. Keys missing from the stored JSON take the
/// defaults below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    sproc_gather_enabled: bool,
    sproc_gather_interval: u64,
    table_stats_gather_enabled: bool,
    table_stats_gather_interval: u64,
    table_io_stats_gather_enabled: bool,
    table_io_stats_gather_interval: u64,
    load_gather_enabled: bool,
    load_gather_interval: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sproc_gather_enabled: true,
            sproc_gather_interval: 300,
            table_stats_gather_enabled: true,
            table_stats_gather_interval: 600,
            table_io_stats_gather_enabled: true,
            table_io_stats_gather_interval: 600,
            load_gather_enabled: true,
            load_gather_interval: 300,
        }
    }
}

impl Settings {
    /// Parse the JSON blob stored with a host.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is not a JSON object with the expected
    /// field types.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub const fn get(&self, kind: MetricKind) -> GatherSetting {
        let (enabled, interval_seconds) = match kind {
            MetricKind::Sproc => (self.sproc_gather_enabled, self.sproc_gather_interval),
            MetricKind::TableStats => (
                self.table_stats_gather_enabled,
                self.table_stats_gather_interval,
            ),
            MetricKind::TableIo => (
                self.table_io_stats_gather_enabled,
                self.table_io_stats_gather_interval,
            ),
            MetricKind::Load => (self.load_gather_enabled, self.load_gather_interval),
        };

        GatherSetting {
            enabled,
            interval_seconds,
        }
    }

    /// Returns a copy of these settings with `kind` replaced.
    #[must_use]
    pub const fn with(mut self, kind: MetricKind, setting: GatherSetting) -> Self {
        let GatherSetting {
            enabled,
            interval_seconds,
        } = setting;

        match kind {
            MetricKind::Sproc => {
                self.sproc_gather_enabled = enabled;
                self.sproc_gather_interval = interval_seconds;
            }
            MetricKind::TableStats => {
                self.table_stats_gather_enabled = enabled;
                self.table_stats_gather_interval = interval_seconds;
            }
            MetricKind::TableIo => {
                self.table_io_stats_gather_enabled = enabled;
                self.table_io_stats_gather_interval = interval_seconds;
            }
            MetricKind::Load => {
                self.load_gather_enabled = enabled;
                self.load_gather_interval = interval_seconds;
            }
        }

        self
    }

    /// Every kind switched off, intervals left at their defaults.
    #[must_use]
    pub fn all_disabled() -> Self {
        MetricKind::ALL.into_iter().fold(Self::default(), |s, kind| {
            let interval = s.get(kind).interval_seconds;
            s.with(kind, GatherSetting::disabled(interval))
        })
    }
}
