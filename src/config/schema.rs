//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::MatchOptions;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route matching behaviour.
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits and access evaluation.
    pub security: SecurityConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Built-in route listing endpoint.
    pub route_overview: RouteOverviewConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7070").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7070".to_string(),
        }
    }
}

/// Route matching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Base path of the application's root router ("" or "/x").
    pub context_path: String,

    /// Treat `/users/` like `/users`.
    pub ignore_trailing_slashes: bool,

    /// Answer 405 (instead of 404) when the path exists for other verbs.
    pub prefer_405: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            context_path: String::new(),
            ignore_trailing_slashes: true,
            prefer_405: false,
        }
    }
}

impl RoutingConfig {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            ignore_trailing_slashes: self.ignore_trailing_slashes,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce response headers, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Header carrying the caller's comma-separated roles.
    pub role_header: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            role_header: "x-role".to_string(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Track connection metrics and serve them.
    pub metrics_enabled: bool,

    /// Path the Prometheus text is served on.
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "route_scope=info,tower_http=info".to_string(),
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Route overview endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteOverviewConfig {
    pub enabled: bool,
    pub path: String,
    /// Roles allowed to read the overview; empty means public.
    pub roles: Vec<String>,
}

impl Default for RouteOverviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/routes".to_string(),
            roles: Vec::new(),
        }
    }
}
