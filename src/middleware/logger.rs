//! Access log.
//!
//! One line per request with `method`, `path`, `status` and `duration`
//! fields, emitted through `tracing`. 5xx lines are logged at `ERROR`, 4xx at
//! `WARN`, everything else at `INFO`.
//!
//! The layer only reads the returned [`Response`]; it never replaces it, and
//! the request's extensions (including any connection-upgrade handle the
//! transport attached) reach the handler untouched.

use std::time::{Duration, Instant};

use http::StatusCode;
use tracing::{error, info, warn};

use super::{Middleware, Next, from_fn};
use crate::request::{Request, RequestHead};
use crate::response::Response;

/// The access-log middleware. Installed on every router as the outermost layer.
pub fn logger() -> Middleware {
    from_fn(|req: Request, next: Next| async move {
        let head = req.head().clone();
        let start = Instant::now();
        let res: Response = next.run(req).await;
        log_request(&head, res.status_code(), start.elapsed());
        res
    })
}

fn log_request(head: &RequestHead, status: StatusCode, elapsed: Duration) {
    let method = head.method.as_str();
    let path = head.path.as_str();
    let status = status.as_u16();

    match status {
        500.. => error!(method, path, status, duration = ?elapsed, "request"),
        400..=499 => warn!(method, path, status, duration = ?elapsed, "request"),
        _ => info!(method, path, status, duration = ?elapsed, "request"),
    }
}
