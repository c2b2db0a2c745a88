//! Application assembly.
//!
//! # Responsibilities
//! - Own the configuration and the route table
//! - Hand out the root [`PathRouter`] (scoped to the context path)
//! - Apply plugins and build the [`HttpServer`]
//!
//! # Design Decisions
//! - The table is shared through `Arc`; routers and plugins hold views
//! - Built-in plugins install once, either explicitly or when the server
//!   is built, so listings taken before serving match what is served

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::admin::RouteOverviewPlugin;
use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::routing::{PathRouter, RegistryError, RouteRegistry, RouteTable};
use crate::security::{roles, AccessEvaluator};

/// Something that registers routes on an [`App`].
pub trait Plugin {
    fn apply(&self, app: &App) -> Result<(), RegistryError>;
}

/// Configuration plus the routes registered against it.
#[derive(Debug)]
pub struct App {
    config: Arc<ServerConfig>,
    table: Arc<RouteTable>,
    builtins_installed: AtomicBool,
}

impl App {
    /// App without access evaluation; role-restricted routes are rejected.
    pub fn new(config: ServerConfig) -> Self {
        let table = RouteTable::new(config.routing.match_options());
        Self {
            config: Arc::new(config),
            table: Arc::new(table),
            builtins_installed: AtomicBool::new(false),
        }
    }

    /// App whose endpoints are all checked by `evaluator`.
    pub fn with_access_evaluator(config: ServerConfig, evaluator: Arc<dyn AccessEvaluator>) -> Self {
        let table = RouteTable::with_access_evaluator(config.routing.match_options(), evaluator);
        Self {
            config: Arc::new(config),
            table: Arc::new(table),
            builtins_installed: AtomicBool::new(false),
        }
    }

    /// Root router, based at `routing.context_path`.
    pub fn routes(&self) -> PathRouter {
        let registry: Arc<dyn RouteRegistry> = self.table.clone();
        PathRouter::with_base_path(registry, self.config.routing.context_path.clone())
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn register_plugin<P: Plugin + ?Sized>(&self, plugin: &P) -> Result<&Self, RegistryError> {
        plugin.apply(self)?;
        Ok(self)
    }

    /// Register the built-in plugins enabled in config. Later calls do
    /// nothing.
    pub fn install_builtins(&self) -> Result<&Self, RegistryError> {
        if self.builtins_installed.swap(true, Ordering::SeqCst) {
            return Ok(self);
        }

        let overview = &self.config.route_overview;
        if overview.enabled {
            let allowed = roles(overview.roles.iter().map(String::as_str));
            self.register_plugin(&RouteOverviewPlugin::new(overview.path.clone(), Some(allowed)))?;
        }
        Ok(self)
    }

    /// Install built-in plugins (if not done yet) and build the server.
    pub fn into_server(self) -> Result<HttpServer, RegistryError> {
        self.install_builtins()?;

        let snapshot = self.table.snapshot();
        tracing::info!(
            routes = snapshot.routes().len(),
            websockets = snapshot.websockets().len(),
            "Application assembled"
        );
        Ok(HttpServer::new(self.config, self.table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler_fn;

    struct Ping;

    impl Plugin for Ping {
        fn apply(&self, app: &App) -> Result<(), RegistryError> {
            app.routes().get("/ping", handler_fn(|ctx| {
                ctx.result("pong");
                Ok(())
            }))?;
            Ok(())
        }
    }

    #[test]
    fn test_root_router_uses_context_path() {
        let mut config = ServerConfig::default();
        config.routing.context_path = "/app".into();
        let app = App::new(config);

        app.register_plugin(&Ping).unwrap();

        let snapshot = app.table().snapshot();
        assert_eq!(snapshot.routes()[0].path(), "/app/ping");
    }

    #[test]
    fn test_builtins_install_once() {
        let app = App::new(ServerConfig::default());
        app.install_builtins().unwrap().install_builtins().unwrap();

        let paths: Vec<String> = app
            .table()
            .snapshot()
            .routes()
            .iter()
            .map(|route| route.path().to_owned())
            .collect();
        assert_eq!(paths, vec!["/routes"]);

        // Building the server must not register the overview again.
        assert!(app.into_server().is_ok());
    }

    #[test]
    fn test_overview_roles_need_evaluator() {
        let mut config = ServerConfig::default();
        config.route_overview.roles = vec!["admin".into()];

        let err = App::new(config).into_server().err().unwrap();
        assert!(matches!(err, RegistryError::MissingAccessManager { .. }));
    }
}
