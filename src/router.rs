//! Route registration.
//!
//! [`Router`] is the mutable, single-threaded half of the lifecycle: routes,
//! groups and middleware are declared on it at startup, then
//! [`Router::handler`] freezes everything into an immutable [`App`] that is
//! shared by all connection tasks.
//!
//! Each route captures its middleware stack when it is registered. Calling
//! [`Router::use_middleware`] later, on this group or an ancestor, never
//! changes routes that already exist.
//!
//! ```rust
//! use trellis::{middleware, Request, Router};
//!
//! #[derive(Clone)]
//! struct ApiVersion(u8);
//!
//! let mut router = Router::new();
//! router.handle("GET /{$}", |_req: Request| async { "Hello, World!" });
//! router.group("/api/", |api| {
//!     api.use_middleware(middleware::provide(ApiVersion(1)));
//!     api.handle("GET /users/{id}", |req: Request| async move {
//!         format!("user {}", req.param("id").unwrap_or_default())
//!     });
//! });
//! let app = router.handler();
//! ```

use std::sync::Arc;

use crate::app::App;
use crate::config::{Mode, Options};
use crate::errors::ErrorHandlers;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{self, Middleware, logger::logger, recover::recoverer};
use crate::pattern::{self, Pattern};
use crate::session;

/// A registered route: its pattern and the leaf handler already wrapped in
/// the middleware stack that was in effect at registration.
#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) pattern: Pattern,
    pub(crate) handler: BoxedHandler,
}

/// Per-router state that every group shares.
pub(crate) struct Base {
    pub(crate) errors: Arc<ErrorHandlers>,
    /// Access log, recovery and session layers; wrap the whole dispatch.
    pub(crate) outer: Vec<Middleware>,
}

/// The route registry.
///
/// A group is just another `Router` handle with a longer prefix and a copy
/// of its parent's middleware stack; its routes are folded back into the
/// parent when the group closure returns.
pub struct Router {
    prefix: String,
    stack: Vec<Middleware>,
    routes: Vec<Route>,
    base: Arc<Base>,
}

impl Router {
    /// A router with default options: access log and panic recovery, no
    /// sessions, built-in error pages, mode from `APP_ENV`.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let mode = options.mode.unwrap_or_else(Mode::from_env);
        let diagnostics = options.diagnostics.unwrap_or_default();
        let errors = Arc::new(ErrorHandlers::new(options.error_handlers));

        let mut outer = vec![logger(), recoverer(mode, diagnostics, Arc::clone(&errors))];
        if let Some(config) = options.session {
            outer.push(session::manager(config));
        }

        Self {
            prefix: "/".to_owned(),
            stack: Vec::new(),
            routes: Vec::new(),
            base: Arc::new(Base { errors, outer }),
        }
    }

    /// Opens a group under `prefix` (joined onto this group's prefix) and
    /// hands it to `configure`. The group starts with this group's current
    /// middleware stack.
    pub fn group(&mut self, prefix: &str, configure: impl FnOnce(&mut Router)) -> &mut Self {
        let mut child = Router {
            prefix: pattern::join(&self.prefix, prefix),
            stack: self.stack.clone(),
            routes: Vec::new(),
            base: Arc::clone(&self.base),
        };
        configure(&mut child);
        self.routes.append(&mut child.routes);
        self
    }

    /// Registers `handler` for `pattern` (`[METHOD ]PATH`) under this group's prefix.
    ///
    /// Without a method token the route answers every method.
    ///
    /// Paths are matched as sent: there is no cleaning and no redirect
    /// between `/dir` and `/dir/`. Registering `/api/` does not make `/api`
    /// match; that request goes to whatever else matches it (a `/` subtree,
    /// say) or to the `404` handler. Register both when both should work.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed. Conflicting registrations are
    /// reported when the router is frozen by [`handler`](Router::handler).
    pub fn handle(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        let pattern = Pattern::parse(&self.prefix, pattern).unwrap_or_else(|e| panic!("{e}"));
        let handler = middleware::chain(&self.stack, handler.into_boxed_handler());
        self.routes.push(Route { pattern, handler });
        self
    }

    /// Appends `middleware` to this group's stack. Affects routes registered
    /// afterwards in this group and groups opened afterwards inside it.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.stack.push(middleware);
        self
    }

    /// Appends several middleware, in order.
    pub fn use_middlewares(&mut self, middleware: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.stack.extend(middleware);
        self
    }

    /// Drops everything inherited or added so far in this group. Parent and
    /// sibling groups keep their stacks. Access log, recovery and sessions
    /// are not part of the stack and keep running.
    pub fn reset_middleware(&mut self) -> &mut Self {
        self.stack.clear();
        self
    }

    /// Freezes the registered routes into the single entry point a listener drives.
    ///
    /// # Panics
    ///
    /// Panics if two routes claim the same method and path.
    pub fn handler(&self) -> App {
        App::freeze(&self.routes, &self.base)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
