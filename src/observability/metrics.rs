//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Track open connections and responses written
//! - Record request latency by method and status
//! - Serve the Prometheus text format through a plugin route
//!
//! # Metrics
//! - `server_connections_active` (gauge): requests currently in flight
//! - `server_connections_max` (gauge): peak of `server_connections_active`
//! - `server_connections_messages_out` (counter): responses written
//! - `server_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Updates are atomic increments plus `metrics` macros (no-ops without
//!   an installed recorder)
//! - The recorder is installed by the binary; the library only emits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::app::{App, Plugin};
use crate::http::handler_fn;
use crate::routing::RegistryError;

pub const CONNECTIONS_ACTIVE: &str = "server_connections_active";
pub const CONNECTIONS_MAX: &str = "server_connections_max";
pub const MESSAGES_OUT: &str = "server_connections_messages_out";
pub const REQUEST_DURATION: &str = "server_request_duration_seconds";

/// Install the process-wide Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Shared counters behind the connection gauges.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMetrics {
    active: Arc<AtomicU64>,
    peak: Arc<AtomicU64>,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }

    fn open(&self) -> OpenConnection {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let peak = self.peak.fetch_max(now, Ordering::SeqCst).max(now);
        gauge!(CONNECTIONS_ACTIVE).set(now as f64);
        gauge!(CONNECTIONS_MAX).set(peak as f64);
        OpenConnection {
            active: Arc::clone(&self.active),
        }
    }
}

/// Decrements the active count when dropped.
struct OpenConnection {
    active: Arc<AtomicU64>,
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!(CONNECTIONS_ACTIVE).set(now as f64);
    }
}

/// Middleware maintaining the connection metrics.
pub async fn track_connections(State(metrics): State<ConnectionMetrics>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let _open = metrics.open();

    let response = next.run(request).await;

    counter!(MESSAGES_OUT).increment(1);
    record_request(&method, response.status().as_u16(), start);
    response
}

/// Record one finished request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    histogram!(
        REQUEST_DURATION,
        "method" => method.to_owned(),
        "status" => status.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Serves the recorder's Prometheus text on a GET route.
#[derive(Clone)]
pub struct MetricsPlugin {
    handle: PrometheusHandle,
    path: String,
}

impl MetricsPlugin {
    pub fn new(handle: PrometheusHandle, path: impl Into<String>) -> Self {
        Self {
            handle,
            path: path.into(),
        }
    }
}

impl Plugin for MetricsPlugin {
    fn apply(&self, app: &App) -> Result<(), RegistryError> {
        let handle = self.handle.clone();
        app.routes().get(
            &self.path,
            handler_fn(move |ctx| {
                ctx.result(handle.render())
                    .set_header("content-type", "text/plain; version=0.0.4")?;
                Ok(())
            }),
        )?;
        tracing::info!(path = %self.path, "Metrics endpoint registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_active_and_peak() {
        let metrics = ConnectionMetrics::new();

        let first = metrics.open();
        let second = metrics.open();
        assert_eq!(metrics.active(), 2);
        drop(first);
        drop(second);
        let _third = metrics.open();

        assert_eq!(metrics.active(), 1);
        assert_eq!(metrics.peak(), 2);
    }
}
