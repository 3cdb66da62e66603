mod gatherers;
mod health;
mod metrics;

pub use gatherers::gatherers;
pub use health::health;
pub use metrics::metrics;
