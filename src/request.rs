//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use hyper::upgrade::OnUpgrade;

/// An incoming HTTP request with its body fully buffered.
///
/// Besides the usual method/path/header accessors it carries two pieces of
/// per-request state: the named captures of the matched route pattern and a
/// typed extension map that middleware use to hand values to handlers deeper
/// in the chain (see [`middleware::provide`](crate::middleware::provide)).
pub struct Request {
    pub(crate) head: RequestHead,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
}

/// The parts of a request that stay available after the request itself has
/// been moved into a handler: what error handlers and the access log see.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
}

impl Request {
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            head: RequestHead { method: parts.method, path: parts.uri.path().to_owned() },
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            extensions: parts.extensions,
        }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn path(&self) -> &str { &self.head.path }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn head(&self) -> &RequestHead { &self.head }

    /// Header lookup; names are case-insensitive. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `GET /users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request-scoped value of type `T`, if a middleware provided one.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Stores a request-scoped value, replacing any previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    /// Raw access to the extension map, including whatever the transport
    /// attached (e.g. hyper's connection-upgrade handle).
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Takes the connection-upgrade handle hyper attaches to requests on
    /// connections served with upgrades enabled (as [`Server`](crate::Server)
    /// does). Answer `101 Switching Protocols` and await the handle in a
    /// spawned task to get the raw connection.
    pub fn on_upgrade(&mut self) -> Option<OnUpgrade> {
        self.extensions.remove::<OnUpgrade>()
    }
}
