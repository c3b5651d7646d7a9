//! # trellis
//!
//! The request-dispatch core of a small web toolkit: nested route groups,
//! an ordered middleware chain with inheritance and reset, a panic recovery
//! boundary, per-status error pages and signed cookie sessions.
//!
//! ## Lifecycle
//!
//! 1. Build a [`Router`]: register routes, open groups, add middleware.
//! 2. Freeze it with [`Router::handler`] into an immutable [`App`].
//! 3. Drive the [`App`] from any listener ([`Server`] is the bundled one).
//!
//! Every request passes through the access log and the recovery layer before
//! anything user-registered, so it is always logged and a panicking handler
//! always turns into a `500` response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trellis::{Options, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::with_options(Options::new().session("change-me", "app_session"));
//!
//!     router.handle("GET /{$}", |_req: Request| async { "Hello, World!" });
//!     router.group("/api/", |api| {
//!         api.handle("GET /users/{id}", get_user);
//!     });
//!
//!     Server::bind("0.0.0.0:3000").serve(router.handler()).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```
//!
//! ## Patterns
//!
//! `[METHOD ]PATH`. A path ending in `/` matches its whole subtree, `{$}`
//! pins it to itself, `{name}` captures a segment and `{name...}` the rest
//! of the path. The most specific matching pattern wins.

mod app;
mod config;
mod error;
mod errors;
mod handler;
mod pattern;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod session;

pub use app::App;
pub use config::{MODE_ENV, Mode, Options};
pub use error::Error;
pub use errors::ErrorHandler;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use middleware::recover::Diagnostics;
pub use middleware::{Middleware, Next};
pub use request::{Request, RequestHead};
pub use response::{BodySender, BoxError, IntoResponse, Response, ResponseBody, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use session::{SameSite, Session, SessionConfig};
