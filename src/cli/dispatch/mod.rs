use crate::{
    backend::SourceOptions,
    cli::actions::{Action, RunOptions},
};
use anyhow::{Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

/// Turn parsed arguments into an [`Action`].
///
/// # Errors
///
/// Returns an error if a required argument is missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .ok_or_else(|| anyhow!("Port is required. Please provide it using the --port flag."))?;

    // None means auto-detect
    let listen = matches.get_one::<String>("listen").cloned();

    let dsn = SecretString::from(
        matches
            .get_one::<String>("dsn")
            .cloned()
            .ok_or_else(|| anyhow!("DSN is required. Please provide it using the --dsn flag."))?,
    );

    let options = RunOptions {
        port,
        listen,
        dsn,
        reload_interval: seconds(matches, "reload-interval")?,
        max_connections: matches
            .get_one::<u32>("max-connections")
            .copied()
            .ok_or_else(|| anyhow!("--max-connections is required"))?,
        source: SourceOptions {
            statement_timeout: seconds(matches, "statement-timeout")?,
            connect_timeout: seconds(matches, "connect-timeout")?,
        },
    };

    debug!(
        port = options.port,
        reload_interval = options.reload_interval.as_secs(),
        statement_timeout = options.source.statement_timeout.as_secs(),
        "parsed options"
    );

    Ok(Action::Run(options))
}

fn seconds(matches: &ArgMatches, name: &str) -> Result<Duration> {
    matches
        .get_one::<u64>(name)
        .copied()
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("--{name} is required"))
}
