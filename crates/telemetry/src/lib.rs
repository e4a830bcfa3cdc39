//! Internal telemetry for the messaging pipeline: in-process counters,
//! gauges, and histograms (§13), plus the tracing subscriber bootstrap
//! and an in-memory health registry.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
