//! Administrative endpoints.
//!
//! Registered through plugins like any other route, so they share the
//! context path, filters and access evaluation of the application.

pub mod handlers;

pub use handlers::{RouteOverview, RouteOverviewPlugin};
