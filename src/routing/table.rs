//! In-memory route table.
//!
//! # Responsibilities
//! - Validate and store routes, filters and WebSocket bindings
//! - Reject duplicates and roles without an access evaluator
//! - Answer dispatch lookups from an immutable snapshot
//!
//! # Design Decisions
//! - Writers serialize on a mutex and publish a new snapshot (copy-on-write)
//! - Readers load the current snapshot without locking
//! - First registered match wins

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use axum::http::Method;

use crate::http::{HandlerRef, PathParams, SseHandlerRef, WsHandlerRef};
use crate::routing::matcher::{MatchOptions, PathPattern};
use crate::routing::registry::{FilterPhase, RegistryError, RouteRegistry, Verb};
use crate::security::{AccessEvaluator, RoleSet};

/// What a route answers with.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Http(HandlerRef),
    Sse(SseHandlerRef),
}

/// A registered HTTP or SSE endpoint.
#[derive(Debug)]
pub struct RouteEntry {
    pub verb: Verb,
    pub pattern: PathPattern,
    pub endpoint: Endpoint,
    pub roles: Option<RoleSet>,
}

impl RouteEntry {
    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }
}

/// A registered before/after filter.
#[derive(Debug)]
pub struct FilterEntry {
    pub phase: FilterPhase,
    pub pattern: PathPattern,
    pub handler: HandlerRef,
}

/// A registered WebSocket endpoint.
#[derive(Debug)]
pub struct WsEntry {
    pub pattern: PathPattern,
    pub handler: WsHandlerRef,
    pub roles: Option<RoleSet>,
}

/// A registered WebSocket before/after hook.
#[derive(Debug)]
pub struct WsFilterEntry {
    pub phase: FilterPhase,
    pub pattern: PathPattern,
    pub handler: WsHandlerRef,
}

/// Result of an endpoint lookup.
#[derive(Debug)]
pub enum RouteMatch {
    Found { entry: Arc<RouteEntry>, params: PathParams },
    /// The path exists, but only for these verbs.
    MethodNotAllowed(Vec<Verb>),
    NotFound,
}

/// Immutable view of everything registered so far.
#[derive(Debug, Clone, Default)]
pub struct RouteSnapshot {
    routes: Vec<Arc<RouteEntry>>,
    filters: Vec<Arc<FilterEntry>>,
    websockets: Vec<Arc<WsEntry>>,
    ws_filters: Vec<Arc<WsFilterEntry>>,
    options: MatchOptions,
}

impl RouteSnapshot {
    pub fn routes(&self) -> &[Arc<RouteEntry>] {
        &self.routes
    }

    pub fn filters(&self) -> &[Arc<FilterEntry>] {
        &self.filters
    }

    pub fn websockets(&self) -> &[Arc<WsEntry>] {
        &self.websockets
    }

    pub fn ws_filters(&self) -> &[Arc<WsFilterEntry>] {
        &self.ws_filters
    }

    /// Find the endpoint for a request. HEAD falls back to a plain GET
    /// route; event streams have no bodiless form.
    pub fn find_route(&self, method: &Method, path: &str) -> RouteMatch {
        let verb = Verb::from_method(method);
        let mut allowed = Vec::new();

        for entry in &self.routes {
            let Some(params) = entry.pattern.match_path(path, self.options) else {
                continue;
            };
            if Some(entry.verb) == verb {
                return RouteMatch::Found {
                    entry: Arc::clone(entry),
                    params,
                };
            }
            if !allowed.contains(&entry.verb) {
                allowed.push(entry.verb);
            }
        }

        if verb == Some(Verb::Head) {
            let plain_gets = self
                .routes
                .iter()
                .filter(|e| e.verb == Verb::Get && matches!(e.endpoint, Endpoint::Http(_)));
            for entry in plain_gets {
                if let Some(params) = entry.pattern.match_path(path, self.options) {
                    return RouteMatch::Found {
                        entry: Arc::clone(entry),
                        params,
                    };
                }
            }
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed(allowed)
        }
    }

    /// Filters of `phase` whose scope covers `path`, in registration order.
    pub fn matching_filters(&self, phase: FilterPhase, path: &str) -> Vec<(Arc<FilterEntry>, PathParams)> {
        self.filters
            .iter()
            .filter(|f| f.phase == phase)
            .filter_map(|f| f.pattern.match_scope(path).map(|params| (Arc::clone(f), params)))
            .collect()
    }

    pub fn find_websocket(&self, path: &str) -> Option<(Arc<WsEntry>, PathParams)> {
        self.websockets.iter().find_map(|entry| {
            entry
                .pattern
                .match_path(path, self.options)
                .map(|params| (Arc::clone(entry), params))
        })
    }

    /// WebSocket hooks of `phase` whose scope covers `path`.
    pub fn matching_ws_filters(&self, phase: FilterPhase, path: &str) -> Vec<Arc<WsFilterEntry>> {
        self.ws_filters
            .iter()
            .filter(|f| f.phase == phase && f.pattern.match_scope(path).is_some())
            .cloned()
            .collect()
    }
}

/// The route table the server dispatches from.
#[derive(Debug)]
pub struct RouteTable {
    current: ArcSwap<RouteSnapshot>,
    writer: Mutex<()>,
    access: Option<Arc<dyn AccessEvaluator>>,
}

impl RouteTable {
    /// Table without an access evaluator; role-restricted registrations fail.
    pub fn new(options: MatchOptions) -> Self {
        Self::build(options, None)
    }

    /// Table whose endpoints are all checked by `evaluator`.
    pub fn with_access_evaluator(options: MatchOptions, evaluator: Arc<dyn AccessEvaluator>) -> Self {
        Self::build(options, Some(evaluator))
    }

    fn build(options: MatchOptions, access: Option<Arc<dyn AccessEvaluator>>) -> Self {
        let snapshot = RouteSnapshot {
            options,
            ..RouteSnapshot::default()
        };
        Self {
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
            access,
        }
    }

    pub fn access_evaluator(&self) -> Option<&Arc<dyn AccessEvaluator>> {
        self.access.as_ref()
    }

    /// Current contents. Later registrations do not affect the returned value.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.current.load_full()
    }

    fn update<F>(&self, apply: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut RouteSnapshot) -> Result<(), RegistryError>,
    {
        let _guard = self.writer.lock().map_err(|_| RegistryError::Poisoned)?;
        let mut next = RouteSnapshot::clone(&self.current.load());
        apply(&mut next)?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    fn check_roles(&self, path: &str, roles: &Option<RoleSet>) -> Result<(), RegistryError> {
        let restricted = roles.as_ref().is_some_and(|r| !r.is_empty());
        if restricted && self.access.is_none() {
            return Err(RegistryError::MissingAccessManager { path: path.to_owned() });
        }
        Ok(())
    }

    fn insert_route(
        &self,
        verb: Verb,
        path: &str,
        endpoint: Endpoint,
        roles: Option<RoleSet>,
    ) -> Result<(), RegistryError> {
        let pattern = compile(path)?;
        self.check_roles(path, &roles)?;

        self.update(|table| {
            if table.routes.iter().any(|r| r.verb == verb && r.path() == path) {
                return Err(RegistryError::DuplicateRoute {
                    verb,
                    path: path.to_owned(),
                });
            }
            table.routes.push(Arc::new(RouteEntry {
                verb,
                pattern,
                endpoint,
                roles,
            }));
            Ok(())
        })?;

        tracing::debug!(verb = %verb, path = %path, "Route registered");
        Ok(())
    }
}

fn compile(path: &str) -> Result<PathPattern, RegistryError> {
    PathPattern::parse(path).map_err(|reason| RegistryError::InvalidPath {
        path: path.to_owned(),
        reason,
    })
}

impl RouteRegistry for RouteTable {
    fn add_route(
        &self,
        verb: Verb,
        path: &str,
        handler: HandlerRef,
        roles: Option<RoleSet>,
    ) -> Result<(), RegistryError> {
        self.insert_route(verb, path, Endpoint::Http(handler), roles)
    }

    fn add_sse(&self, path: &str, client: SseHandlerRef, roles: Option<RoleSet>) -> Result<(), RegistryError> {
        self.insert_route(Verb::Get, path, Endpoint::Sse(client), roles)
    }

    fn add_filter(&self, phase: FilterPhase, path: &str, handler: HandlerRef) -> Result<(), RegistryError> {
        let pattern = compile(path)?;
        self.update(|table| {
            table.filters.push(Arc::new(FilterEntry {
                phase,
                pattern,
                handler,
            }));
            Ok(())
        })?;
        tracing::debug!(phase = ?phase, path = %path, "Filter registered");
        Ok(())
    }

    fn add_ws(&self, path: &str, ws: WsHandlerRef, roles: Option<RoleSet>) -> Result<(), RegistryError> {
        let pattern = compile(path)?;
        self.check_roles(path, &roles)?;
        self.update(|table| {
            if table.websockets.iter().any(|w| w.pattern.as_str() == path) {
                return Err(RegistryError::DuplicateWebSocket { path: path.to_owned() });
            }
            table.websockets.push(Arc::new(WsEntry {
                pattern,
                handler: ws,
                roles,
            }));
            Ok(())
        })?;
        tracing::debug!(path = %path, "WebSocket endpoint registered");
        Ok(())
    }

    fn add_ws_filter(&self, phase: FilterPhase, path: &str, ws: WsHandlerRef) -> Result<(), RegistryError> {
        let pattern = compile(path)?;
        self.update(|table| {
            table.ws_filters.push(Arc::new(WsFilterEntry {
                phase,
                pattern,
                handler: ws,
            }));
            Ok(())
        })?;
        tracing::debug!(phase = ?phase, path = %path, "WebSocket hook registered");
        Ok(())
    }
}
