pub mod run;

use crate::backend::SourceOptions;
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug)]
pub enum Action {
    Run(RunOptions),
}

/// Everything the daemon needs to start.
#[derive(Debug)]
pub struct RunOptions {
    pub port: u16,
    pub listen: Option<String>,
    pub dsn: SecretString,
    pub reload_interval: Duration,
    pub max_connections: u32,
    pub source: SourceOptions,
}
