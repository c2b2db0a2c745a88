//! Prefix-scoped routing for an Axum-backed HTTP server.
//!
//! Applications register routes, filters, server-sent event streams and
//! WebSocket endpoints through a [`PathRouter`]; nested routers prepend
//! their base path and forward every registration to one shared
//! [`RouteTable`], which the [`HttpServer`] dispatches from.

// Core subsystems
pub mod app;
pub mod config;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use app::{App, Plugin};
pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{PathRouter, RegistryError, RouteRegistry, RouteTable};
