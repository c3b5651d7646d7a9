//! Unified error type.

use thiserror::Error;

/// The error value handed to error handlers and returned by fallible operations.
///
/// Routing misses and recovered handler panics are ordinary values of this
/// type; none of them ever escapes a request as a Rust panic. The `Display`
/// output is the text the default error handlers write into the body.
#[derive(Debug, Error)]
pub enum Error {
    /// No route matched the request.
    #[error("404 page not found")]
    NotFound,

    /// A handler or middleware panicked; carries the panic message.
    #[error("{0}")]
    Panic(String),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The client stopped reading a streamed response.
    #[error("response body receiver dropped")]
    Disconnected,

    /// Binding or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A session value could not be converted to or from JSON.
    #[error("session value: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Free-form error raised by application code.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Builds an [`Error::Message`] from anything printable.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Message(message.to_string())
    }
}
