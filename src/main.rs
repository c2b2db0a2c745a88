//! route-scope demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, request id, timeout, metrics)
//!                         │
//!                         ▼
//!                     routing::table snapshot ◀── PathRouter views ◀── App / plugins
//!                         │
//!                         ▼
//!                     before filters → endpoint | sse | websocket → after filters
//!                         │
//!     Client Response     ▼
//!     ◀────────────── http::context
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use route_scope::config::{load_config, ServerConfig};
use route_scope::http::{handler_fn, sse_fn, ws_fn, HandlerError};
use route_scope::lifecycle::{spawn_signal_handler, Shutdown};
use route_scope::observability::metrics::install_recorder;
use route_scope::observability::{init_logging, MetricsPlugin};
use route_scope::routing::Verb;
use route_scope::security::{roles, HeaderRoleEvaluator};
use route_scope::{App, Plugin, RegistryError};

#[derive(Parser)]
#[command(name = "route-scope")]
#[command(about = "Demo server for prefix-scoped routing", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the registered route table and exit
    Routes,
}

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
}

/// Health check, a nested user API, an SSE clock and a WebSocket echo.
#[derive(Default)]
struct DemoApi {
    users: Arc<Mutex<BTreeMap<u64, User>>>,
    next_id: Arc<AtomicU64>,
}

impl Plugin for DemoApi {
    fn apply(&self, app: &App) -> Result<(), RegistryError> {
        let root = app.routes();

        root.get(
            "/health",
            handler_fn(|ctx| {
                ctx.result("ok");
                Ok(())
            }),
        )?;

        let api = root.path("/api/v1");
        api.before(
            None,
            handler_fn(|ctx| {
                ctx.set_header("x-api-version", "v1")?;
                Ok(())
            }),
        )?;

        let (list, find) = (Arc::clone(&self.users), Arc::clone(&self.users));
        let (create, remove) = (Arc::clone(&self.users), Arc::clone(&self.users));
        let next_id = Arc::clone(&self.next_id);

        api.path_with("/users", |users| {
            users
                .get(
                    "",
                    handler_fn(move |ctx| {
                        let all: Vec<User> = lock(&list)?.values().cloned().collect();
                        ctx.json(&all)?;
                        Ok(())
                    }),
                )?
                .get(
                    "/:id",
                    handler_fn(move |ctx| {
                        let id = user_id(ctx.path_param("id"))?;
                        let user = lock(&find)?
                            .get(&id)
                            .cloned()
                            .ok_or_else(|| HandlerError::not_found(format!("No user {id}")))?;
                        ctx.json(&user)?;
                        Ok(())
                    }),
                )?
                .route(
                    Verb::Post,
                    "",
                    handler_fn(move |ctx| {
                        let new: NewUser = ctx.body_json()?;
                        let id = next_id.fetch_add(1, Ordering::SeqCst) + 1;
                        let user = User { id, name: new.name };
                        lock(&create)?.insert(id, user.clone());
                        ctx.set_status(axum::http::StatusCode::CREATED).json(&user)?;
                        Ok(())
                    }),
                    Some(roles(["admin"])),
                )?
                .route(
                    Verb::Delete,
                    "/:id",
                    handler_fn(move |ctx| {
                        let id = user_id(ctx.path_param("id"))?;
                        lock(&remove)?
                            .remove(&id)
                            .ok_or_else(|| HandlerError::not_found(format!("No user {id}")))?;
                        ctx.set_status(axum::http::StatusCode::NO_CONTENT);
                        Ok(())
                    }),
                    Some(roles(["admin"])),
                )?;
            Ok(())
        })?;

        root.sse(
            "/clock",
            sse_fn(|client| {
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(Duration::from_secs(1));
                    loop {
                        ticker.tick().await;
                        let now = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .map(|d| d.as_secs())
                            .unwrap_or_default();
                        if !client.send_event("tick", &now.to_string()) {
                            break;
                        }
                    }
                });
            }),
            None,
        )?;

        root.ws(
            "/echo",
            ws_fn(|ws| {
                ws.on_message(|ctx, text| {
                    ctx.send(text.to_owned());
                });
            }),
            None,
        )?;

        Ok(())
    }
}

fn lock<T>(store: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, HandlerError> {
    store
        .lock()
        .map_err(|_| HandlerError::Internal("user store poisoned".into()))
}

fn user_id(raw: Option<&str>) -> Result<u64, HandlerError> {
    raw.and_then(|id| id.parse().ok())
        .ok_or_else(|| HandlerError::bad_request("User id must be a number"))
}

/// Register the demo routes, the metrics endpoint (when a handle is given)
/// and the built-in plugins.
fn assemble(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Result<App, RegistryError> {
    let evaluator = Arc::new(HeaderRoleEvaluator::new(config.security.role_header.clone()));
    let app = App::with_access_evaluator(config, evaluator);
    app.register_plugin(&DemoApi::default())?;

    if let Some(handle) = metrics {
        let path = app.config().observability.metrics_path.clone();
        app.register_plugin(&MetricsPlugin::new(handle, path))?;
    }

    app.install_builtins()?;
    Ok(app)
}

/// One line per registered route, as printed by `routes`.
fn route_listing(app: &App) -> Vec<String> {
    let snapshot = app.table().snapshot();
    let routes = snapshot
        .routes()
        .iter()
        .map(|route| format!("{:<8}{}", route.verb, route.path()));
    let sockets = snapshot
        .websockets()
        .iter()
        .map(|ws| format!("{:<8}{}", "WS", ws.pattern.as_str()));
    routes.chain(sockets).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "route-scope starting");

    let metrics = if config.observability.metrics_enabled {
        Some(install_recorder()?)
    } else {
        None
    };
    let app = assemble(config, metrics)?;

    if let Some(Commands::Routes) = cli.command {
        for line in route_listing(&app) {
            println!("{line}");
        }
        return Ok(());
    }

    let bind_address = app.config().listener.bind_address.clone();
    let server = app.into_server()?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
