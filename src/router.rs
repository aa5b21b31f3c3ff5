//! Request routing: the one place application logic meets the framing layer.
//!
//! A [`Router`] maps `(method, path)` to a handler and serves files below a
//! static prefix. Every outcome is a [`Response`]; failures become error pages.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::RouteError;
use crate::headers::HeaderMap;

/// Default URL prefix for static files.
pub const DEFAULT_STATIC_PREFIX: &str = "/static";

/// Methods a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A complete request as assembled by a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    pub fn method(&self) -> &str {
        self.headers.get(":method").unwrap_or("")
    }

    /// `:path` without the query string.
    pub fn path(&self) -> &str {
        let full = self.headers.get(":path").unwrap_or("/");
        full.split_once('?').map_or(full, |(path, _)| path)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response. `headers` always carries `:status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(":status", status.to_string());
        Self {
            headers,
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    /// 200 with a `text/plain` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.headers.get(":status").and_then(|s| s.parse().ok())
    }

    fn error_page(status: u16, title: &str) -> Self {
        let body = format!(
            "<!DOCTYPE html>\n<html><head><title>{status} {title}</title></head>\
             <body><h1>{status} {title}</h1></body></html>\n"
        );
        Self::new(status)
            .with_header("content-type", "text/html")
            .with_body(body.into_bytes())
    }

    pub fn bad_request() -> Self {
        Self::error_page(400, "Bad Request")
    }

    pub fn forbidden() -> Self {
        Self::error_page(403, "Forbidden")
    }

    pub fn not_found() -> Self {
        Self::error_page(404, "Not Found")
    }

    pub fn internal_error() -> Self {
        Self::error_page(500, "Internal Server Error")
    }

    pub fn not_implemented() -> Self {
        Self::error_page(501, "Not Implemented")
    }
}

/// Application callback for one route.
pub type Handler = Box<dyn Fn(&Request) -> Result<Response, RouteError> + Send + Sync>;

/// Routing table: handlers by method and exact path, plus a static-file root.
///
/// Shared read-only by every connection of a server.
pub struct Router {
    routes: HashMap<(Method, String), Handler>,
    static_prefix: String,
    static_root: Option<PathBuf>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<_> = self.routes.keys().collect();
        routes.sort_by(|a, b| a.1.cmp(&b.1));
        f.debug_struct("Router")
            .field("routes", &routes)
            .field("static_prefix", &self.static_prefix)
            .field("static_root", &self.static_root)
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            static_prefix: DEFAULT_STATIC_PREFIX.to_string(),
            static_root: None,
        }
    }

    pub fn route<F>(mut self, method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, RouteError> + Send + Sync + 'static,
    {
        self.routes.insert((method, path.into()), Box::new(handler));
        self
    }

    pub fn get<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, RouteError> + Send + Sync + 'static,
    {
        self.route(Method::Get, path, handler)
    }

    pub fn post<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, RouteError> + Send + Sync + 'static,
    {
        self.route(Method::Post, path, handler)
    }

    pub fn put<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, RouteError> + Send + Sync + 'static,
    {
        self.route(Method::Put, path, handler)
    }

    pub fn delete<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, RouteError> + Send + Sync + 'static,
    {
        self.route(Method::Delete, path, handler)
    }

    /// Serve files under `root` for request paths starting with `prefix`.
    pub fn static_files(mut self, prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.static_prefix = prefix.into();
        self.static_root = Some(root.into());
        self
    }

    pub fn static_prefix(&self) -> &str {
        &self.static_prefix
    }

    /// Produce the response for a complete request. Never fails.
    ///
    /// A handler response missing `:status` gets 200. One missing
    /// `content-type` gets a type guessed from the request path's extension,
    /// or `application/octet-stream`, whatever the status or body.
    pub fn respond(&self, request: &Request) -> Response {
        let path = request.path();
        if let Some(root) = &self.static_root {
            if let Some(relative) = path.strip_prefix(self.static_prefix.as_str()) {
                if relative.is_empty() || relative.starts_with('/') {
                    return serve_static(root, request.method(), relative);
                }
            }
        }

        let Some(method) = Method::parse(request.method()) else {
            debug!(method = request.method(), path, "unsupported method");
            return Response::not_implemented();
        };

        let Some(handler) = self.routes.get(&(method, path.to_string())) else {
            debug!(?method, path, "no route");
            return Response::not_found();
        };

        match handler(request) {
            Ok(mut response) => {
                if !response.headers.contains(":status") {
                    response.headers.insert(":status", "200");
                }
                if !response.headers.contains("content-type") {
                    response.headers.insert(
                        "content-type",
                        content_type(path).unwrap_or("application/octet-stream"),
                    );
                }
                response
            }
            Err(e) => {
                warn!(?method, path, error = %e, "handler failed");
                Response::internal_error()
            }
        }
    }
}

fn serve_static(root: &Path, method: &str, relative: &str) -> Response {
    if method != "GET" {
        return Response::not_implemented();
    }

    let relative = relative.trim_start_matches('/');
    let escapes_root = Path::new(relative)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes_root {
        warn!(path = relative, "static path escapes root");
        return Response::forbidden();
    }

    let file = root.join(relative);
    match fs::read(&file) {
        Ok(body) => Response::ok()
            .with_header(
                "content-type",
                content_type(relative).unwrap_or("application/octet-stream"),
            )
            .with_body(body),
        Err(e) => {
            debug!(file = %file.display(), error = %e, "static file unavailable");
            Response::not_found()
        }
    }
}

/// Content type guessed from a file extension.
pub fn content_type(path: &str) -> Option<&'static str> {
    let (_, ext) = path.rsplit_once('.')?;
    Some(match ext {
        "html" => "text/html",
        "js" => "application/javascript",
        "json" => "application/json",
        "css" => "text/css",
        "png" => "image/png",
        "jpeg" | "jpg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        _ => return None,
    })
}
