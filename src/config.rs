//! Construction options.
//!
//! ```rust
//! use http::StatusCode;
//! use trellis::{Options, Response, Router};
//!
//! let router = Router::with_options(
//!     Options::new()
//!         .session("change-me", "app_session")
//!         .error_handler(StatusCode::NOT_FOUND, |_head, _err| Response::text("nothing here")),
//! );
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use http::StatusCode;

use crate::error::Error;
use crate::errors::ErrorHandler;
use crate::middleware::recover::Diagnostics;
use crate::request::RequestHead;
use crate::response::Response;
use crate::session::SessionConfig;

/// Environment variable that selects the execution mode.
pub const MODE_ENV: &str = "APP_ENV";

/// Execution mode. Only affects how much failure detail leaves the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Recovered panics print their trace to the diagnostics stream.
    Development,
    #[default]
    Production,
}

impl Mode {
    /// Reads [`MODE_ENV`]; `development` selects [`Mode::Development`], anything
    /// else (or nothing) selects [`Mode::Production`].
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV) {
            Ok(v) if v.eq_ignore_ascii_case("development") => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

/// Options accepted by [`Router::with_options`](crate::Router::with_options).
#[derive(Default)]
pub struct Options {
    pub(crate) session: Option<SessionConfig>,
    pub(crate) error_handlers: HashMap<StatusCode, ErrorHandler>,
    pub(crate) mode: Option<Mode>,
    pub(crate) diagnostics: Option<Diagnostics>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables cookie sessions signed with `secret`, stored in `cookie_name`.
    pub fn session(self, secret: impl Into<Vec<u8>>, cookie_name: impl Into<String>) -> Self {
        self.session_config(SessionConfig::new(secret, cookie_name))
    }

    /// Enables cookie sessions with full control over the cookie attributes.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = Some(config);
        self
    }

    /// Overrides the renderer used for `status`.
    pub fn error_handler<F>(mut self, status: StatusCode, handler: F) -> Self
    where
        F: Fn(&RequestHead, &Error) -> Response + Send + Sync + 'static,
    {
        self.error_handlers.insert(status, Arc::new(handler));
        self
    }

    /// Forces the execution mode instead of reading [`MODE_ENV`].
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Redirects development-mode panic traces away from stderr.
    pub fn diagnostics(mut self, writer: impl Write + Send + 'static) -> Self {
        self.diagnostics = Some(Diagnostics::new(writer));
        self
    }
}
