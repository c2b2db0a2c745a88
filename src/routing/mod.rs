//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (startup):
//!     application code
//!     → router.rs (PathRouter: base path + path)
//!     → registry.rs (RouteRegistry contract)
//!     → table.rs (validate, compile pattern, publish snapshot)
//!
//! Dispatch (per request):
//!     method + path
//!     → table.rs snapshot lookup
//!     → matcher.rs (segment matching, param extraction)
//!     → matched endpoint / filters, or NotFound / MethodNotAllowed
//! ```
//!
//! # Design Decisions
//! - Nested routers are views; only the table holds state
//! - Snapshots are immutable; lookups never lock
//! - Deterministic: first registered match wins

pub mod matcher;
pub mod registry;
pub mod router;
pub mod table;

pub use matcher::{MatchOptions, PathPattern, PatternError, ALL_PATHS};
pub use registry::{FilterPhase, RegistryError, RouteRegistry, Verb};
pub use router::{PathRouter, RouterResult};
pub use table::{Endpoint, RouteMatch, RouteSnapshot, RouteTable};
