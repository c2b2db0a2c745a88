//! Role-based access evaluation.
//! Decides whether a request may reach a role-restricted endpoint.

use axum::http::StatusCode;

use crate::http::Context;
use crate::security::{Role, RoleSet};

/// Outcome of an access evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied { status: StatusCode, message: String },
}

impl Access {
    pub fn denied(status: StatusCode, message: impl Into<String>) -> Self {
        Access::Denied {
            status,
            message: message.into(),
        }
    }
}

/// Capability consulted before every endpoint, SSE stream and WebSocket
/// upgrade once installed on the routing table.
pub trait AccessEvaluator: Send + Sync + 'static {
    fn evaluate(&self, ctx: &Context, permitted: &RoleSet) -> Access;
}

impl std::fmt::Debug for dyn AccessEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessEvaluator")
    }
}

/// Reads the caller's roles from a comma-separated request header.
#[derive(Debug, Clone)]
pub struct HeaderRoleEvaluator {
    header: String,
}

impl HeaderRoleEvaluator {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_lowercase(),
        }
    }

    fn caller_roles(&self, ctx: &Context) -> Option<RoleSet> {
        ctx.header(&self.header).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(Role::new)
                .collect()
        })
    }
}

impl Default for HeaderRoleEvaluator {
    fn default() -> Self {
        Self::new("x-role")
    }
}

impl AccessEvaluator for HeaderRoleEvaluator {
    fn evaluate(&self, ctx: &Context, permitted: &RoleSet) -> Access {
        // Unrestricted endpoint.
        if permitted.is_empty() {
            return Access::Granted;
        }

        let caller = match self.caller_roles(ctx) {
            Some(roles) if !roles.is_empty() => roles,
            _ => {
                tracing::debug!(path = %ctx.path(), header = %self.header, "Missing role header");
                return Access::denied(StatusCode::UNAUTHORIZED, "Unauthorized");
            }
        };

        if caller.iter().any(|role| permitted.contains(role)) {
            Access::Granted
        } else {
            tracing::debug!(path = %ctx.path(), "Caller lacks a permitted role");
            Access::denied(StatusCode::FORBIDDEN, "Forbidden")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::roles;
    use axum::body::Bytes;
    use axum::http::{Method, Request};

    fn ctx_with_role(value: Option<&str>) -> Context {
        let mut builder = Request::builder().method(Method::GET).uri("/admin");
        if let Some(value) = value {
            builder = builder.header("X-Role", value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        Context::from_parts(&parts, Bytes::new())
    }

    #[test]
    fn test_unrestricted_endpoint_is_granted() {
        let evaluator = HeaderRoleEvaluator::default();
        assert_eq!(evaluator.evaluate(&ctx_with_role(None), &RoleSet::new()), Access::Granted);
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let evaluator = HeaderRoleEvaluator::default();
        let access = evaluator.evaluate(&ctx_with_role(None), &roles(["admin"]));
        assert!(matches!(access, Access::Denied { status, .. } if status == StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_role_intersection() {
        let evaluator = HeaderRoleEvaluator::default();
        let permitted = roles(["admin", "ops"]);

        assert_eq!(
            evaluator.evaluate(&ctx_with_role(Some("reader, ops")), &permitted),
            Access::Granted
        );
        let denied = evaluator.evaluate(&ctx_with_role(Some("reader")), &permitted);
        assert!(matches!(denied, Access::Denied { status, .. } if status == StatusCode::FORBIDDEN));
    }
}
