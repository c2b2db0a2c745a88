//! WebSocket endpoints.
//!
//! # Responsibilities
//! - Assemble the callback chain (ws_before hooks, endpoint, ws_after hooks)
//! - Complete the upgrade handshake
//! - Run the session: dispatch frames to callbacks, forward outgoing frames
//!
//! # Data Flow
//! ```text
//! Client ──frames──▶ reader loop ──▶ WsConfig callbacks
//! Client ◀──frames── writer task ◀── WsContext::send (channel)
//! ```
//!
//! # Design Decisions
//! - Callbacks are synchronous; long work should be spawned
//! - Close frames end the session; queued frames and the close reply are
//!   flushed before the socket is dropped; ping/pong handled by axum
//! - Server shutdown closes open sessions with 1001
//! - Sends after the session ended are dropped and report `false`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, request, HeaderMap};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::http::context::{parse_query, PathParams};
use crate::lifecycle::ShutdownSignal;

/// Close code sent when the server shuts down.
const GOING_AWAY: u16 = 1001;

/// Time allowed to flush the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type ConnectFn = Arc<dyn Fn(&WsContext) + Send + Sync>;
type MessageFn = Arc<dyn Fn(&WsContext, &str) + Send + Sync>;
type BinaryFn = Arc<dyn Fn(&WsContext, &[u8]) + Send + Sync>;
type CloseFn = Arc<dyn Fn(&WsContext, &CloseStatus) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&WsContext, &str) + Send + Sync>;

/// Configures the callbacks of a WebSocket endpoint or hook.
pub trait WsHandler: Send + Sync + 'static {
    fn configure(&self, ws: &mut WsConfig);
}

/// Shared WebSocket configurator reference, as stored by the registry.
pub type WsHandlerRef = Arc<dyn WsHandler>;

impl std::fmt::Debug for dyn WsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WsHandler")
    }
}

struct FnWsHandler<F>(F);

impl<F> WsHandler for FnWsHandler<F>
where
    F: Fn(&mut WsConfig) + Send + Sync + 'static,
{
    fn configure(&self, ws: &mut WsConfig) {
        (self.0)(ws)
    }
}

/// Wrap a closure into a [`WsHandlerRef`].
pub fn ws_fn<F>(f: F) -> WsHandlerRef
where
    F: Fn(&mut WsConfig) + Send + Sync + 'static,
{
    Arc::new(FnWsHandler(f))
}

/// Close code and reason reported by the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: Option<u16>,
    pub reason: String,
}

/// Ordered callback lists for one session.
#[derive(Default, Clone)]
pub struct WsConfig {
    on_connect: Vec<ConnectFn>,
    on_message: Vec<MessageFn>,
    on_binary: Vec<BinaryFn>,
    on_close: Vec<CloseFn>,
    on_error: Vec<ErrorFn>,
}

impl WsConfig {
    pub fn on_connect<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WsContext) + Send + Sync + 'static,
    {
        self.on_connect.push(Arc::new(f));
        self
    }

    pub fn on_message<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WsContext, &str) + Send + Sync + 'static,
    {
        self.on_message.push(Arc::new(f));
        self
    }

    pub fn on_binary<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WsContext, &[u8]) + Send + Sync + 'static,
    {
        self.on_binary.push(Arc::new(f));
        self
    }

    pub fn on_close<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WsContext, &CloseStatus) + Send + Sync + 'static,
    {
        self.on_close.push(Arc::new(f));
        self
    }

    pub fn on_error<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WsContext, &str) + Send + Sync + 'static,
    {
        self.on_error.push(Arc::new(f));
        self
    }

    fn fire_connect(&self, ctx: &WsContext) {
        self.on_connect.iter().for_each(|f| f(ctx));
    }

    fn fire_message(&self, ctx: &WsContext, text: &str) {
        self.on_message.iter().for_each(|f| f(ctx, text));
    }

    fn fire_binary(&self, ctx: &WsContext, data: &[u8]) {
        self.on_binary.iter().for_each(|f| f(ctx, data));
    }

    fn fire_close(&self, ctx: &WsContext, status: &CloseStatus) {
        self.on_close.iter().for_each(|f| f(ctx, status));
    }

    fn fire_error(&self, ctx: &WsContext, error: &str) {
        self.on_error.iter().for_each(|f| f(ctx, error));
    }
}

impl std::fmt::Debug for WsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConfig")
            .field("on_connect", &self.on_connect.len())
            .field("on_message", &self.on_message.len())
            .field("on_binary", &self.on_binary.len())
            .field("on_close", &self.on_close.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

#[derive(Debug)]
struct WsSession {
    id: Uuid,
    path: String,
    matched_path: String,
    path_params: PathParams,
    query: HashMap<String, String>,
    headers: HeaderMap,
}

/// Handle on a live session, passed to every callback.
#[derive(Debug, Clone)]
pub struct WsContext {
    session: Arc<WsSession>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl WsContext {
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn path(&self) -> &str {
        &self.session.path
    }

    pub fn matched_path(&self) -> &str {
        &self.session.matched_path
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.session.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.session.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.session.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Queue a text frame. Returns `false` once the session has ended.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(Message::Text(Utf8Bytes::from(text.into()))).is_ok()
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.outgoing.send(Message::Binary(data.into())).is_ok()
    }

    /// Queue a normal close frame.
    pub fn close(&self) -> bool {
        let frame = CloseFrame {
            code: 1000,
            reason: Utf8Bytes::from_static(""),
        };
        self.outgoing.send(Message::Close(Some(frame))).is_ok()
    }
}

/// True when the request asks for a WebSocket upgrade.
pub(crate) fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Complete the handshake and spawn the session.
pub(crate) async fn upgrade(
    mut parts: request::Parts,
    matched_path: String,
    path_params: PathParams,
    config: WsConfig,
    shutdown: ShutdownSignal,
) -> Response {
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let session = WsSession {
        id: Uuid::new_v4(),
        path: parts.uri.path().to_owned(),
        matched_path,
        path_params,
        query: parse_query(parts.uri.query()),
        headers: parts.headers.clone(),
    };

    upgrade.on_upgrade(move |socket| run_session(socket, session, config, shutdown))
}

async fn run_session(socket: WebSocket, session: WsSession, config: WsConfig, mut shutdown: ShutdownSignal) {
    let (sink, mut stream) = socket.split();
    let (outgoing, queue) = mpsc::unbounded_channel::<Message>();
    let (done, finished) = oneshot::channel::<()>();
    let ctx = WsContext {
        session: Arc::new(session),
        outgoing,
    };
    let session_id = ctx.session_id();

    tracing::debug!(session_id = %session_id, path = %ctx.path(), "WebSocket session opened");

    let mut writer = tokio::spawn(write_frames(sink, queue, finished));

    config.fire_connect(&ctx);

    let mut status = CloseStatus::default();
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = shutdown.recv() => {
                status.code = Some(GOING_AWAY);
                status.reason = "server shutting down".to_owned();
                let _ = ctx.outgoing.send(Message::Close(Some(CloseFrame {
                    code: GOING_AWAY,
                    reason: Utf8Bytes::from_static("server shutting down"),
                })));
                break;
            }
        };
        let Some(frame) = frame else {
            break;
        };
        match frame {
            Ok(Message::Text(text)) => config.fire_message(&ctx, text.as_str()),
            Ok(Message::Binary(data)) => config.fire_binary(&ctx, &data),
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    status.code = Some(frame.code);
                    status.reason = frame.reason.to_string();
                }
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "WebSocket receive error");
                config.fire_error(&ctx, &err.to_string());
                break;
            }
        }
    }

    config.fire_close(&ctx, &status);

    // Let the writer flush what is queued plus the close reply.
    let _ = done.send(());
    if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
        tracing::warn!(session_id = %session_id, "WebSocket close handshake timed out");
        writer.abort();
    }
    tracing::debug!(session_id = %session_id, code = ?status.code, "WebSocket session closed");
}

/// Forward queued frames until the session ends, then drain the queue and
/// close the sink. Closing flushes the reply to a peer-initiated close.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::UnboundedReceiver<Message>,
    mut finished: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            message = queue.recv() => {
                let Some(message) = message else {
                    break;
                };
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    return;
                }
            }
            _ = &mut finished => break,
        }
    }

    while let Ok(message) = queue.try_recv() {
        if sink.send(message).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}
