//! Status-code keyed error renderers.
//!
//! One table per router. Lookups fall back to the built-in renderers:
//!
//! | Status | Default body |
//! |---|---|
//! | `404` | `404 page not found` |
//! | `500` | the error message, also logged at `ERROR` with `status=500` |
//! | other | the canonical reason phrase |

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;

use crate::error::Error;
use crate::request::RequestHead;
use crate::response::Response;

/// Renders the response for an error status.
pub type ErrorHandler = Arc<dyn Fn(&RequestHead, &Error) -> Response + Send + Sync + 'static>;

pub(crate) struct ErrorHandlers {
    handlers: HashMap<StatusCode, ErrorHandler>,
}

impl ErrorHandlers {
    pub(crate) fn new(overrides: HashMap<StatusCode, ErrorHandler>) -> Self {
        let mut handlers: HashMap<StatusCode, ErrorHandler> = HashMap::new();
        handlers.insert(StatusCode::NOT_FOUND, Arc::new(not_found));
        handlers.insert(StatusCode::INTERNAL_SERVER_ERROR, Arc::new(internal_error));
        handlers.extend(overrides);
        Self { handlers }
    }

    /// Renders `err` with the handler for `status`.
    ///
    /// A renderer that leaves the status at a success code gets `status`
    /// forced onto its response, so custom pages only need to write a body.
    pub(crate) fn render(&self, status: StatusCode, head: &RequestHead, err: &Error) -> Response {
        let mut res = match self.handlers.get(&status) {
            Some(handler) => handler(head, err),
            None => reason_phrase(status),
        };
        if res.status_code().is_success() {
            res.set_status(status);
        }
        res
    }
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

fn not_found(_head: &RequestHead, _err: &Error) -> Response {
    Response::builder().status(StatusCode::NOT_FOUND).text("404 page not found")
}

fn internal_error(_head: &RequestHead, err: &Error) -> Response {
    Response::error(StatusCode::INTERNAL_SERVER_ERROR, err)
}

fn reason_phrase(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("error");
    Response::builder().status(status).text(format!("{} {reason}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;

    fn head() -> RequestHead {
        RequestHead { method: Method::GET, path: "/missing".to_owned() }
    }

    #[test]
    fn defaults_cover_not_found_and_internal_error() {
        let errors = ErrorHandlers::default();

        let res = errors.render(StatusCode::NOT_FOUND, &head(), &Error::NotFound);
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), b"404 page not found");

        let res = errors.render(StatusCode::INTERNAL_SERVER_ERROR, &head(), &Error::Panic("boom".into()));
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"boom\n");
    }

    #[test]
    fn override_keeps_the_error_status() {
        let mut overrides: HashMap<StatusCode, ErrorHandler> = HashMap::new();
        overrides.insert(
            StatusCode::NOT_FOUND,
            Arc::new(|head: &RequestHead, _: &Error| Response::text(format!("no {}", head.path))),
        );
        let errors = ErrorHandlers::new(overrides);

        let res = errors.render(StatusCode::NOT_FOUND, &head(), &Error::NotFound);
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), b"no /missing");
    }

    #[test]
    fn unknown_status_falls_back_to_reason_phrase() {
        let errors = ErrorHandlers::default();
        let res = errors.render(StatusCode::BAD_REQUEST, &head(), &Error::Body("eof".into()));
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), b"400 Bad Request");
    }
}
