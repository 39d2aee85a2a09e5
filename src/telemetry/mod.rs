mod metrics;
mod tracing;

pub use self::metrics::{counters, metrics_handler};
pub use self::tracing::init_tracing;
