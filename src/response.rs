//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers build a [`Response`] and return it; middleware receive it back on
//! the way out and may inspect or amend it (the access log reads the status,
//! the session layer appends a `set-cookie` header).
//!
//! A body is either buffered or streamed. Layers only touch the status and
//! headers, so a streamed body reaches the client frame by frame through
//! every middleware, each frame flushed as the handler produces it.

use std::convert::Infallible;
use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt, stream};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::Error;

/// Error type of a streamed body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The body type handed to the transport.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use trellis::Response;
///
/// Response::text("hello");
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::SEE_OTHER)
///     .header("location", "/")
///     .no_body();
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Payload,
}

pub(crate) enum Payload {
    Buffered(Bytes),
    Streaming(ResponseBody),
}

impl Response {
    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().bytes("application/json", body)
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().bytes("text/html; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Payload::Buffered(Bytes::new()) }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, headers: HeaderMap::new() }
    }

    /// Signals a problem from inside a handler without panicking.
    ///
    /// Logs `err` at error level and answers with `status` and the error
    /// message as a plain-text body. The recovery layer is not involved.
    pub fn error(status: StatusCode, err: impl Display) -> Self {
        let message = err.to_string();
        error!(status = status.as_u16(), "{message}");
        Self::builder().status(status).text(format!("{message}\n"))
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// The buffered body. Empty for a streamed response.
    pub fn body(&self) -> &[u8] {
        match &self.body {
            Payload::Buffered(bytes) => bytes,
            Payload::Streaming(_) => &[],
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Payload::Streaming(_))
    }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Converts into the `http` response type hyper writes to the wire.
    pub fn into_http(self) -> http::Response<ResponseBody> {
        let body = match self.body {
            Payload::Buffered(bytes) => Full::new(bytes).map_err(|never: Infallible| -> BoxError { match never {} }).boxed_unsync(),
            Payload::Streaming(body) => body,
        };
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning rather than failing the response.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes(TEXT_PLAIN, body.into().into_bytes())
    }

    /// Terminate with a JSON body.
    pub fn json(self, body: Vec<u8>) -> Response {
        self.bytes("application/json", body)
    }

    /// Terminate with an arbitrary content type.
    pub fn bytes(mut self, content_type: &'static str, body: Vec<u8>) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { status: self.status, headers: self.headers, body: Payload::Buffered(Bytes::from(body)) }
    }

    /// Terminate with a body streamed from `chunks`. Each item is sent to the
    /// client as soon as it is yielded; an `Err` aborts the response.
    pub fn stream<S, E>(mut self, content_type: &'static str, chunks: S) -> Response
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        let body = StreamBody::new(chunks.map_ok(Frame::data).map_err(|e| -> BoxError { e.into() }));
        self.body(body)
    }

    /// Terminate with a streamed body fed through the returned [`BodySender`].
    /// The body ends when the sender is dropped.
    ///
    /// ```rust
    /// use trellis::{Request, Response};
    ///
    /// async fn events(_req: Request) -> Response {
    ///     let (tx, res) = Response::builder().channel("text/event-stream", 8);
    ///     tokio::spawn(async move {
    ///         for n in 0..3 {
    ///             if tx.send(format!("data: {n}\n\n")).await.is_err() {
    ///                 break;
    ///             }
    ///         }
    ///     });
    ///     res
    /// }
    /// ```
    pub fn channel(self, content_type: &'static str, buffer: usize) -> (BodySender, Response) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let chunks = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
        });
        (BodySender(tx), self.stream(content_type, chunks))
    }

    /// Terminate with any [`http_body::Body`], e.g. a proxied upstream body.
    pub fn body<B>(self, body: B) -> Response
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Response {
            status: self.status,
            headers: self.headers,
            body: Payload::Streaming(body.map_err(|e| -> BoxError { e.into() }).boxed_unsync()),
        }
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Payload::Buffered(Bytes::new()) }
    }
}

/// Write half of a [`ResponseBuilder::channel`] body.
pub struct BodySender(mpsc::Sender<Bytes>);

impl BodySender {
    /// Sends one chunk. Fails once the client is gone.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<(), Error> {
        self.0.send(chunk.into()).await.map_err(|_| Error::Disconnected)
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a bare status from a handler: `return StatusCode::NO_CONTENT`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Override the status of any other response: `(StatusCode::CREATED, "made")`
impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut res = self.1.into_response();
        res.status = self.0;
        res
    }
}

/// `Err` renders through [`Response::error`] as a `500`.
impl<T: IntoResponse> IntoResponse for Result<T, Error> {
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => Response::error(StatusCode::INTERNAL_SERVER_ERROR, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ok() {
        let res = Response::text("hi");
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(res.body(), b"hi");
    }

    #[test]
    fn invalid_header_is_dropped() {
        let res = Response::builder().header("bad header", "x").header("x-ok", "1").no_body();
        assert_eq!(res.headers().len(), 1);
        assert_eq!(res.headers()["x-ok"], "1");
    }

    #[test]
    fn error_helper_writes_status_and_message() {
        let res = Response::error(StatusCode::BAD_REQUEST, "missing name");
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), b"missing name\n");
    }

    #[test]
    fn tuple_overrides_status() {
        let res = (StatusCode::CREATED, "made").into_response();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), b"made");
    }

    #[tokio::test]
    async fn streamed_body_yields_each_chunk() {
        let chunks = stream::iter(["one", "two"].map(|c| Ok::<_, Infallible>(Bytes::from_static(c.as_bytes()))));
        let res = Response::builder().stream("text/plain", chunks);
        assert!(res.is_streaming());
        assert!(res.body().is_empty());

        let mut body = res.into_http().into_body();
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap(), "one");
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap(), "two");
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn sender_fails_after_the_body_is_dropped() {
        let (tx, res) = Response::builder().channel("text/plain", 1);
        drop(res);
        assert!(matches!(tx.send("late").await, Err(Error::Disconnected)));
    }

    #[test]
    fn err_result_becomes_internal_error() {
        let res: Result<&'static str, Error> = Err(Error::msg("db down"));
        let res = res.into_response();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"db down\n");
    }
}
