//! Per-host periodic execution of gatherers.
//!
//! Every host gets its own [`HostExecutor`], a single task that runs that
//! host's jobs one after another. Different hosts never share one, so a
//! host stuck on a slow query only delays itself.

pub mod coordinator;
pub mod executor;
pub mod host;
pub mod task;

pub use coordinator::Coordinator;
pub use executor::{ExecutorHandle, HostExecutor};
pub use host::HostScheduler;
pub use task::ScheduledGatherer;
