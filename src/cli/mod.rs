//! Command line: argument parsing, dispatch into an [`actions::Action`],
//! and the logging and tracing setup shared by every action.

pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

mod start;
pub use self::start::start;
