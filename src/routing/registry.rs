//! The registration contract every route table implements.

use std::fmt;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{HandlerRef, SseHandlerRef, WsHandlerRef};
use crate::routing::matcher::PatternError;
use crate::security::RoleSet;

/// HTTP verbs a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Get,
        Verb::Post,
        Verb::Put,
        Verb::Patch,
        Verb::Delete,
        Verb::Head,
        Verb::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
        }
    }

    /// Map a request method; `None` for methods no route can carry.
    pub fn from_method(method: &Method) -> Option<Self> {
        Verb::ALL.into_iter().find(|verb| verb.as_str() == method.as_str())
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Whether a filter or hook runs before or after the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPhase {
    Before,
    After,
}

/// Errors raised while registering routes.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        path: String,
        #[source]
        reason: PatternError,
    },

    #[error("handler with verb {verb} and path '{path}' already exists")]
    DuplicateRoute { verb: Verb, path: String },

    #[error("WebSocket handler for path '{path}' already exists")]
    DuplicateWebSocket { path: String },

    #[error("roles given for '{path}' but no access evaluator is installed")]
    MissingAccessManager { path: String },

    #[error("route table lock poisoned")]
    Poisoned,
}

/// Authoritative table of routes, filters and WebSocket bindings.
///
/// Every operation takes an absolute path. Implementations decide what is
/// valid; callers forward errors unchanged.
pub trait RouteRegistry: Send + Sync {
    /// Register an HTTP endpoint.
    fn add_route(
        &self,
        verb: Verb,
        path: &str,
        handler: HandlerRef,
        roles: Option<RoleSet>,
    ) -> Result<(), RegistryError>;

    /// Register a server-sent event endpoint (served on GET).
    fn add_sse(&self, path: &str, client: SseHandlerRef, roles: Option<RoleSet>) -> Result<(), RegistryError>;

    /// Register a before/after filter. `*` applies it to every path.
    fn add_filter(&self, phase: FilterPhase, path: &str, handler: HandlerRef) -> Result<(), RegistryError>;

    /// Register a WebSocket endpoint.
    fn add_ws(&self, path: &str, ws: WsHandlerRef, roles: Option<RoleSet>) -> Result<(), RegistryError>;

    /// Register a WebSocket before/after hook.
    fn add_ws_filter(&self, phase: FilterPhase, path: &str, ws: WsHandlerRef) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_from_method() {
        assert_eq!(Verb::from_method(&Method::PATCH), Some(Verb::Patch));
        assert_eq!(Verb::from_method(&Method::TRACE), None);
        assert_eq!(Verb::Options.to_string(), "OPTIONS");
    }

    #[test]
    fn test_error_messages() {
        let err = RegistryError::DuplicateRoute {
            verb: Verb::Get,
            path: "/users".into(),
        };
        assert_eq!(err.to_string(), "handler with verb GET and path '/users' already exists");
    }
}
