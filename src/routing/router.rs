//! Prefix-scoped route registration.
//!
//! # Responsibilities
//! - Prepend the base path to every registration
//! - Derive nested routers (`path`) and nested groups (`path_with`)
//! - Forward each call to the registry exactly once
//!
//! # Design Decisions
//! - Plain string concatenation; no slash normalization
//! - No validation here; registry errors are returned unchanged
//! - Immutable: deriving a nested router never touches the parent

use std::fmt;
use std::sync::Arc;

use crate::http::{HandlerRef, SseHandlerRef, WsHandlerRef};
use crate::routing::registry::{FilterPhase, RegistryError, RouteRegistry, Verb};
use crate::security::RoleSet;

/// Result of a registration call; `Ok` carries the router for chaining.
pub type RouterResult<'a> = Result<&'a PathRouter, RegistryError>;

/// A view onto a [`RouteRegistry`] scoped to a base path.
#[derive(Clone)]
pub struct PathRouter {
    registry: Arc<dyn RouteRegistry>,
    base_path: String,
}

impl PathRouter {
    /// Root router (base path `""`).
    pub fn new(registry: Arc<dyn RouteRegistry>) -> Self {
        Self::with_base_path(registry, "")
    }

    pub fn with_base_path(registry: Arc<dyn RouteRegistry>, base_path: impl Into<String>) -> Self {
        Self {
            registry,
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Router whose base path is `self.base_path() + suffix`.
    pub fn path(&self, suffix: &str) -> PathRouter {
        Self {
            registry: Arc::clone(&self.registry),
            base_path: self.resolve(suffix),
        }
    }

    /// Run `configure` against the nested router for `suffix`, then hand
    /// back this router (not the nested one).
    pub fn path_with<F>(&self, suffix: &str, configure: F) -> RouterResult<'_>
    where
        F: FnOnce(&PathRouter) -> Result<(), RegistryError>,
    {
        configure(&self.path(suffix))?;
        Ok(self)
    }

    /// Register `handler` for `verb` at `base + path`, optionally restricted
    /// to `roles`.
    pub fn route(&self, verb: Verb, path: &str, handler: HandlerRef, roles: Option<RoleSet>) -> RouterResult<'_> {
        self.registry.add_route(verb, &self.resolve(path), handler, roles)?;
        Ok(self)
    }

    pub fn get(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Get, path, handler, None)
    }

    pub fn post(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Post, path, handler, None)
    }

    pub fn put(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Put, path, handler, None)
    }

    pub fn patch(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Patch, path, handler, None)
    }

    pub fn delete(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Delete, path, handler, None)
    }

    pub fn head(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Head, path, handler, None)
    }

    pub fn options(&self, path: &str, handler: HandlerRef) -> RouterResult<'_> {
        self.route(Verb::Options, path, handler, None)
    }

    /// Server-sent event endpoint at `base + path`.
    pub fn sse(&self, path: &str, client: SseHandlerRef, roles: Option<RoleSet>) -> RouterResult<'_> {
        self.registry.add_sse(&self.resolve(path), client, roles)?;
        Ok(self)
    }

    /// Before filter at `base + path`, or at `base` itself when `path` is
    /// `None` (every route under this scope).
    pub fn before(&self, path: Option<&str>, handler: HandlerRef) -> RouterResult<'_> {
        self.filter(FilterPhase::Before, path, handler)
    }

    /// After filter; see [`PathRouter::before`].
    pub fn after(&self, path: Option<&str>, handler: HandlerRef) -> RouterResult<'_> {
        self.filter(FilterPhase::After, path, handler)
    }

    pub fn ws(&self, path: &str, ws: WsHandlerRef, roles: Option<RoleSet>) -> RouterResult<'_> {
        self.registry.add_ws(&self.resolve(path), ws, roles)?;
        Ok(self)
    }

    pub fn ws_before(&self, path: Option<&str>, ws: WsHandlerRef) -> RouterResult<'_> {
        self.ws_filter(FilterPhase::Before, path, ws)
    }

    pub fn ws_after(&self, path: Option<&str>, ws: WsHandlerRef) -> RouterResult<'_> {
        self.ws_filter(FilterPhase::After, path, ws)
    }

    fn filter(&self, phase: FilterPhase, path: Option<&str>, handler: HandlerRef) -> RouterResult<'_> {
        self.registry.add_filter(phase, &self.resolve_scope(path), handler)?;
        Ok(self)
    }

    fn ws_filter(&self, phase: FilterPhase, path: Option<&str>, ws: WsHandlerRef) -> RouterResult<'_> {
        self.registry.add_ws_filter(phase, &self.resolve_scope(path), ws)?;
        Ok(self)
    }

    fn resolve(&self, path: &str) -> String {
        let mut absolute = String::with_capacity(self.base_path.len() + path.len());
        absolute.push_str(&self.base_path);
        absolute.push_str(path);
        absolute
    }

    fn resolve_scope(&self, path: Option<&str>) -> String {
        match path {
            Some(path) => self.resolve(path),
            None => self.base_path.clone(),
        }
    }
}

impl fmt::Debug for PathRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRouter")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}
