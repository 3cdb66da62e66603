use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;
use tracing::Level;

/// Log level for the number of `-v` flags given.
///
/// A daemon stays quiet by default but still reports warnings such as
/// clamped intervals or hosts whose connection parameters changed.
const fn log_level(verbose_count: u8) -> Level {
    match verbose_count {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Parse the command line, set up logging and tracing, and return what to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialized or the arguments are incomplete.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(Some(log_level(matches.get_count("verbose"))))?;

    let action = handler(&matches)?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "pg_gatherer starting");

    Ok(action)
}
