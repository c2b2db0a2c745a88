//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware, dispatch)
//!     → websocket.rs (upgrade requests with a matching binding)
//!     → context.rs (buffered request, response being built)
//!     → before filters → endpoint / sse.rs → after filters
//!     → Send to client
//! ```

pub mod context;
pub mod server;
pub mod sse;
pub mod websocket;

pub use context::{handler_fn, Context, Handler, HandlerError, HandlerRef, HandlerResult, PathParams};
pub use server::HttpServer;
pub use sse::{sse_fn, SseClient, SseHandler, SseHandlerRef};
pub use websocket::{ws_fn, CloseStatus, WsConfig, WsContext, WsHandler, WsHandlerRef};
