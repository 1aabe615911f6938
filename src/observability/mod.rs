// Structured logging
pub mod logging;

// Prometheus counters
pub mod metrics;

pub use logging::init_logging;
pub use metrics::install_prometheus;
