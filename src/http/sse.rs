//! Server-sent event streams.
//!
//! # Data Flow
//! ```text
//! GET matched to an SSE endpoint
//!     → SseClient created (request snapshot + channel sender)
//!     → SseHandler::connect(client)   (handler keeps/spawns the client)
//!     → channel receiver streamed as text/event-stream
//! ```
//!
//! # Design Decisions
//! - The stream stays open while any clone of the client is alive
//! - Sends after the peer disconnected return `false` instead of erroring
//! - Keep-alive comments come from axum's `KeepAlive`
//! - Server shutdown ends every open stream so the drain can finish

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::http::context::{parse_query, Context, PathParams};
use crate::lifecycle::ShutdownSignal;

/// Handler invoked once per SSE connection.
pub trait SseHandler: Send + Sync + 'static {
    fn connect(&self, client: SseClient);
}

/// Shared SSE handler reference, as stored by the registry.
pub type SseHandlerRef = Arc<dyn SseHandler>;

impl std::fmt::Debug for dyn SseHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SseHandler")
    }
}

struct FnSseHandler<F>(F);

impl<F> SseHandler for FnSseHandler<F>
where
    F: Fn(SseClient) + Send + Sync + 'static,
{
    fn connect(&self, client: SseClient) {
        (self.0)(client)
    }
}

/// Wrap a closure into an [`SseHandlerRef`].
pub fn sse_fn<F>(f: F) -> SseHandlerRef
where
    F: Fn(SseClient) + Send + Sync + 'static,
{
    Arc::new(FnSseHandler(f))
}

#[derive(Debug)]
struct SseRequest {
    path: String,
    path_params: PathParams,
    query: HashMap<String, String>,
    headers: HeaderMap,
}

/// One connected event-stream client.
#[derive(Debug, Clone)]
pub struct SseClient {
    request: Arc<SseRequest>,
    events: mpsc::UnboundedSender<Event>,
}

impl SseClient {
    /// Send a named event. Returns `false` once the client is gone.
    pub fn send_event(&self, event: &str, data: &str) -> bool {
        self.send(Event::default().event(event).data(data))
    }

    /// Send an unnamed `message` event.
    pub fn send_data(&self, data: &str) -> bool {
        self.send(Event::default().data(data))
    }

    /// Send a named event with an id, for clients resuming via `Last-Event-ID`.
    pub fn send_event_with_id(&self, event: &str, data: &str, id: &str) -> bool {
        self.send(Event::default().event(event).data(data).id(id))
    }

    pub fn send_comment(&self, comment: &str) -> bool {
        self.send(Event::default().comment(comment))
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.request.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn send(&self, event: Event) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Hand a new client to `handler` and turn its channel into the response.
///
/// The stream ends when the last client clone is dropped or `shutdown`
/// fires, whichever comes first.
pub(crate) fn connect(handler: &dyn SseHandler, ctx: &Context, mut shutdown: ShutdownSignal) -> Response {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = SseClient {
        request: Arc::new(SseRequest {
            path: ctx.path().to_owned(),
            path_params: ctx.path_params().clone(),
            query: parse_query(ctx.query_string()),
            headers: ctx.headers().clone(),
        }),
        events: tx,
    };

    tracing::debug!(path = %ctx.path(), "SSE client connected");
    handler.connect(client);

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<Event, Infallible>(event), rx))
    })
    .take_until(async move { shutdown.recv().await });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use axum::http::Method;
    use std::time::Duration;

    #[tokio::test]
    async fn test_client_reports_closed_when_stream_dropped() {
        let kept = Arc::new(std::sync::Mutex::new(None));
        let slot = kept.clone();
        let handler = sse_fn(move |client| {
            assert!(client.send_data("hello"));
            *slot.lock().unwrap() = Some(client);
        });

        let mut ctx = Context::new(Method::GET, "/events/7");
        ctx.set_match("/events/:id", PathParams::from([("id".to_owned(), "7".to_owned())]));
        let response = connect(handler.as_ref(), &ctx, Shutdown::new().subscribe());
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let client = kept.lock().unwrap().take().unwrap();
        assert_eq!(client.path_param("id"), Some("7"));
        assert!(!client.is_closed());

        drop(response);
        assert!(client.is_closed());
        assert!(!client.send_event("tick", "1"));
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream_while_client_is_held() {
        let kept = Arc::new(std::sync::Mutex::new(None));
        let slot = kept.clone();
        let handler = sse_fn(move |client| {
            client.send_data("hello");
            *slot.lock().unwrap() = Some(client);
        });
        let shutdown = Shutdown::new();

        let response = connect(handler.as_ref(), &Context::new(Method::GET, "/clock"), shutdown.subscribe());
        shutdown.trigger();

        tokio::time::timeout(
            Duration::from_secs(2),
            axum::body::to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .unwrap()
        .unwrap();

        let client = kept.lock().unwrap().take().unwrap();
        assert!(client.is_closed());
    }
}
