//! HTTP server setup and dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with a single dispatching fallback
//! - Wire up middleware (timeout, request ID, tracing, connection metrics)
//! - Bind server to listener and shut down gracefully
//! - Dispatch requests against the current route snapshot
//!
//! # Design Decisions
//! - Axum only carries the transport; matching happens in the route table
//! - The snapshot is loaded once per request, so a request never observes
//!   a half-applied registration
//! - After filters always run, also when a before filter or the endpoint
//!   failed
//! - Shutdown ends open SSE streams and WebSocket sessions, otherwise
//!   their connections would keep the drain waiting

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::context::{Context, HandlerError, PathParams};
use crate::http::{sse, websocket, WsConfig};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::metrics::{track_connections, ConnectionMetrics};
use crate::routing::table::WsEntry;
use crate::routing::{Endpoint, FilterPhase, RouteMatch, RouteSnapshot, RouteTable, Verb};
use crate::security::{Access, RoleSet};

/// State injected into the dispatcher.
#[derive(Clone)]
struct DispatchState {
    table: Arc<RouteTable>,
    config: Arc<ServerConfig>,
    streams: ShutdownSignal,
}

/// HTTP server answering from a [`RouteTable`].
pub struct HttpServer {
    router: Router,
    config: Arc<ServerConfig>,
    streams: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server dispatching from `table`.
    pub fn new(config: Arc<ServerConfig>, table: Arc<RouteTable>) -> Self {
        let streams = Shutdown::new();
        let state = DispatchState {
            table,
            config: Arc::clone(&config),
            streams: streams.subscribe(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            streams,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: DispatchState) -> Router {
        let mut router = Router::new().fallback(dispatch).with_state(state);

        if config.observability.metrics_enabled {
            router = router.layer(middleware::from_fn_with_state(
                ConnectionMetrics::new(),
                track_connections,
            ));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            context_path = %self.config.routing.context_path,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let streams = self.streams;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                streams.trigger();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Single entry point for every request.
async fn dispatch(State(state): State<DispatchState>, request: Request) -> Response {
    let snapshot = state.table.snapshot();
    let (parts, body) = request.into_parts();

    if websocket::is_upgrade_request(&parts.headers) {
        if let Some((entry, params)) = snapshot.find_websocket(parts.uri.path()) {
            return upgrade_websocket(&state, &snapshot, parts, entry, params).await;
        }
    }

    let body = match axum::body::to_bytes(body, state.config.security.max_body_size).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %parts.uri.path(), error = %err, "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large").into_response();
        }
    };

    let mut ctx = Context::from_parts(&parts, body);
    tracing::debug!(method = %ctx.method(), path = %ctx.path(), "Dispatching request");

    let mut stream = None;
    if run_filters(&snapshot, FilterPhase::Before, &mut ctx) {
        stream = run_endpoint(&state, &snapshot, &mut ctx);
    }
    run_filters(&snapshot, FilterPhase::After, &mut ctx);

    stream.unwrap_or_else(|| ctx.into_response())
}

/// Run the filters of `phase`. Returns false if any failed.
///
/// Before filters stop at the first error; after filters all run.
fn run_filters(snapshot: &RouteSnapshot, phase: FilterPhase, ctx: &mut Context) -> bool {
    let path = ctx.path().to_owned();
    let mut succeeded = true;

    for (filter, params) in snapshot.matching_filters(phase, &path) {
        ctx.set_match(filter.pattern.as_str(), params);
        if let Err(err) = filter.handler.handle(ctx) {
            tracing::debug!(
                path = %path,
                filter = %filter.pattern.as_str(),
                phase = ?phase,
                error = %err,
                "Filter failed"
            );
            ctx.apply_error(&err);
            succeeded = false;
            if phase == FilterPhase::Before {
                break;
            }
        }
    }

    succeeded
}

/// Run the matched endpoint. Returns a response only for streams.
fn run_endpoint(state: &DispatchState, snapshot: &RouteSnapshot, ctx: &mut Context) -> Option<Response> {
    let entry = match snapshot.find_route(ctx.method(), ctx.path()) {
        RouteMatch::Found { entry, params } => {
            ctx.set_match(entry.path(), params);
            entry
        }
        RouteMatch::MethodNotAllowed(verbs) if state.config.routing.prefer_405 => {
            let allow = verbs.iter().map(Verb::as_str).collect::<Vec<_>>().join(", ");
            ctx.apply_error(&HandlerError::status(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
            if let Err(err) = ctx.set_header("allow", &allow) {
                tracing::warn!(error = %err, "Failed to set Allow header");
            }
            return None;
        }
        RouteMatch::MethodNotAllowed(_) | RouteMatch::NotFound => {
            tracing::debug!(method = %ctx.method(), path = %ctx.path(), "No route matched");
            ctx.apply_error(&HandlerError::not_found("Not found"));
            return None;
        }
    };

    if let Access::Denied { status, message } = check_access(&state.table, ctx, entry.roles.as_ref()) {
        tracing::debug!(path = %ctx.path(), status = %status, "Access denied");
        ctx.apply_error(&HandlerError::status(status, message));
        return None;
    }

    match &entry.endpoint {
        Endpoint::Http(handler) => {
            if let Err(err) = handler.handle(ctx) {
                if err.status_code().is_server_error() {
                    tracing::warn!(path = %ctx.path(), error = %err, "Handler failed");
                } else {
                    tracing::debug!(path = %ctx.path(), error = %err, "Handler rejected request");
                }
                ctx.apply_error(&err);
            }
            None
        }
        Endpoint::Sse(handler) => Some(sse::connect(handler.as_ref(), ctx, state.streams.clone())),
    }
}

/// Consult the table's evaluator, if any. Unrestricted endpoints are
/// evaluated against an empty role set.
fn check_access(table: &RouteTable, ctx: &Context, roles: Option<&RoleSet>) -> Access {
    let Some(evaluator) = table.access_evaluator() else {
        return Access::Granted;
    };
    let unrestricted = RoleSet::new();
    evaluator.evaluate(ctx, roles.unwrap_or(&unrestricted))
}

/// Evaluate access, assemble the session callbacks and upgrade.
async fn upgrade_websocket(
    state: &DispatchState,
    snapshot: &RouteSnapshot,
    parts: request::Parts,
    entry: Arc<WsEntry>,
    params: PathParams,
) -> Response {
    let mut ctx = Context::from_parts(&parts, Bytes::new());
    ctx.set_match(entry.pattern.as_str(), params.clone());

    if let Access::Denied { status, message } = check_access(&state.table, &ctx, entry.roles.as_ref()) {
        tracing::debug!(path = %ctx.path(), status = %status, "WebSocket upgrade denied");
        return (status, message).into_response();
    }

    let path = ctx.path();
    let mut config = WsConfig::default();
    for hook in snapshot.matching_ws_filters(FilterPhase::Before, path) {
        hook.handler.configure(&mut config);
    }
    entry.handler.configure(&mut config);
    for hook in snapshot.matching_ws_filters(FilterPhase::After, path) {
        hook.handler.configure(&mut config);
    }

    let matched_path = entry.pattern.as_str().to_owned();
    websocket::upgrade(parts, matched_path, params, config, state.streams.clone()).await
}
