//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registration and dispatch produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (connection gauges, response counter, latency)
//!
//! Consumers:
//!     → Log output (stdout)
//!     → Metrics endpoint (Prometheus scrape via MetricsPlugin)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through tower-http layers
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{ConnectionMetrics, MetricsPlugin};
