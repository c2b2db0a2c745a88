//! Per-request context handed to handlers and filters.
//!
//! # Responsibilities
//! - Expose the request (method, path, params, query, headers, body)
//! - Accumulate the response (status, headers, body)
//! - Carry typed attributes between filters and the endpoint
//!
//! # Design Decisions
//! - Handlers are synchronous; the body is buffered before dispatch
//! - Handlers are shared as `Arc<dyn Handler>` so the registry keeps the
//!   exact reference it was given

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header, request, Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Path parameters extracted from a matched pattern (`/users/:id`).
pub type PathParams = HashMap<String, String>;

/// Errors a handler or filter can raise. Each maps to an HTTP status.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Stop processing and answer with the given status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else; answered with 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::status(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::status(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    /// HTTP status this error answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::Status { status, .. } => *status,
            HandlerError::Json(_) => StatusCode::BAD_REQUEST,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for handlers and filters.
pub type HandlerResult = Result<(), HandlerError>;

/// An HTTP endpoint or filter.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context) -> HandlerResult;
}

/// Shared handler reference, as stored by the registry.
pub type HandlerRef = Arc<dyn Handler>;

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut Context) -> HandlerResult {
        (self.0)(ctx)
    }
}

/// Wrap a closure into a [`HandlerRef`].
pub fn handler_fn<F>(f: F) -> HandlerRef
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Request/response state for a single dispatch.
#[derive(Debug)]
pub struct Context {
    method: Method,
    path: String,
    matched_path: Option<String>,
    path_params: PathParams,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    attributes: Extensions,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Bytes,
}

impl Context {
    /// Build a context from request parts and a buffered body.
    pub fn from_parts(parts: &request::Parts, body: Bytes) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        let mut ctx = Self::new(parts.method.clone(), parts.uri.path());
        ctx.query = parts.uri.query().map(str::to_owned);
        ctx.headers = parts.headers.clone();
        ctx.body = body;
        ctx.remote_addr = remote_addr;
        ctx
    }

    /// Build an empty context for `method` and `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            matched_path: None,
            path_params: PathParams::new(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            attributes: Extensions::new(),
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path as received.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Pattern of the handler currently running (`/users/:id`).
    pub fn matched_path(&self) -> Option<&str> {
        self.matched_path.as_deref()
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// First value of a query parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params().remove(name)
    }

    /// All query parameters; for repeated keys the first value wins.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query(self.query.as_deref())
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> Result<&str, HandlerError> {
        std::str::from_utf8(&self.body)
            .map_err(|_| HandlerError::bad_request("Request body is not valid UTF-8"))
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Typed attribute set by an earlier filter.
    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }

    pub fn set_attribute<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.attributes.insert(value);
        self
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn response_status(&self) -> StatusCode {
        self.status
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, HandlerError> {
        let name = HeaderName::try_from(name)
            .map_err(|_| HandlerError::Internal(format!("invalid header name: {name}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|_| HandlerError::Internal(format!("invalid value for header {name}")))?;
        self.response_headers.insert(name, value);
        Ok(self)
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a plain-text body.
    pub fn result(&mut self, body: impl Into<String>) -> &mut Self {
        self.write_body(body.into(), "text/plain; charset=utf-8")
    }

    pub fn html(&mut self, body: impl Into<String>) -> &mut Self {
        self.write_body(body.into(), "text/html; charset=utf-8")
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, HandlerError> {
        let body = serde_json::to_vec(value)?;
        Ok(self.write_body(body, "application/json"))
    }

    pub fn response_body(&self) -> &[u8] {
        &self.response_body
    }

    fn write_body(&mut self, body: impl Into<Bytes>, content_type: &'static str) -> &mut Self {
        self.response_body = body.into();
        self.response_headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self
    }

    /// Point the context at the pattern of the handler about to run.
    pub(crate) fn set_match(&mut self, pattern: &str, params: PathParams) {
        self.matched_path = Some(pattern.to_owned());
        self.path_params = params;
    }

    /// Replace the response with the error's status and message.
    pub(crate) fn apply_error(&mut self, err: &HandlerError) {
        self.status = err.status_code();
        self.result(err.to_string());
    }

    pub(crate) fn into_response(self) -> Response {
        let body = if self.method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(self.response_body)
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response.into_response()
    }
}

/// Parse a raw query string; for repeated keys the first value wins.
pub(crate) fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str) -> request::Parts {
        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-role", "admin")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_reads_request_parts() {
        let ctx = Context::from_parts(&parts("/users/7?page=2&q=a%20b&page=3"), Bytes::from("{\"n\":1}"));

        assert_eq!(*ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/users/7");
        assert_eq!(ctx.query_param("page").as_deref(), Some("2"));
        assert_eq!(ctx.query_param("q").as_deref(), Some("a b"));
        assert_eq!(ctx.header("x-role"), Some("admin"));
        let body: serde_json::Value = ctx.body_json().unwrap();
        assert_eq!(body["n"], 1);
    }

    #[test]
    fn test_json_result_sets_content_type() {
        let mut ctx = Context::new(Method::GET, "/");
        ctx.json(&serde_json::json!({"ok": true})).unwrap();

        assert_eq!(ctx.response_header("content-type"), Some("application/json"));
        assert_eq!(ctx.response_body(), b"{\"ok\":true}");
    }

    #[test]
    fn test_error_maps_to_status() {
        let mut ctx = Context::new(Method::GET, "/");
        ctx.apply_error(&HandlerError::forbidden("nope"));
        assert_eq!(ctx.response_status(), StatusCode::FORBIDDEN);
        assert_eq!(ctx.response_body(), b"nope");

        let err = HandlerError::Internal("boom".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_attributes_flow_between_handlers() {
        #[derive(Clone)]
        struct UserId(u64);

        let mut ctx = Context::new(Method::GET, "/");
        ctx.set_attribute(UserId(42));
        assert_eq!(ctx.attribute::<UserId>().map(|u| u.0), Some(42));
    }

    #[test]
    fn test_head_response_has_no_body() {
        let mut ctx = Context::new(Method::HEAD, "/");
        ctx.result("hidden");
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
