//! Periodic PostgreSQL statistics gatherer.
//!
//! Every monitored host gets its own serial executor running up to four
//! gatherers (stored procedures, table stats, table IO stats, load). Each
//! gatherer buffers what it reads, resolves dimension ids against the sink
//! and only writes rows whose cumulative counters moved since the last write.

pub mod backend;
pub mod cli;
pub mod gatherers;
pub mod hosts;
pub mod scheduler;
pub mod status;
