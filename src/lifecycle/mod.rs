//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     watch → HttpServer stops accepting, SSE streams and WebSocket sessions end
//!           → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - Routes are registered before the listener binds (traffic only when ready)
//! - Shutdown is a watch channel so late subscribers still see it and tests
//!   can trigger it without signals

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{spawn_signal_handler, wait_for_signal};
