//! Cookie-backed sessions.
//!
//! Session state lives entirely in a signed cookie held by the client; the
//! server keeps nothing between requests. When sessions are enabled, every
//! request gets a [`Session`] in its extensions:
//!
//! ```rust
//! use trellis::{Options, Request, Router, Session};
//!
//! let mut router = Router::with_options(Options::new().session("change-me", "app_session"));
//! router.handle("POST /visit", |req: Request| async move {
//!     let session = req.session().expect("sessions enabled");
//!     let visits = session.get::<u64>("visits").unwrap_or(0) + 1;
//!     session.insert("visits", visits)?;
//!     Ok::<_, trellis::Error>(format!("visit #{visits}"))
//! });
//! ```
//!
//! A cookie that is missing, tampered with or expired yields an empty
//! session. A `set-cookie` header is emitted only if the session was written
//! during the request.

mod codec;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cookie::Cookie;
use http::HeaderValue;
use http::header::{COOKIE, SET_COOKIE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error};

pub use cookie::SameSite;

use crate::error::Error;
use crate::middleware::{Middleware, Next, from_fn};
use crate::request::Request;
use crate::response::Response;
use codec::Codec;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Cookie settings for the session layer.
///
/// Defaults: `Path=/`, `HttpOnly`, `SameSite=Lax`, no `Max-Age` (browser
/// session cookie), not `Secure`.
#[derive(Clone)]
pub struct SessionConfig {
    pub(crate) secret: Vec<u8>,
    pub(crate) cookie_name: String,
    pub(crate) path: String,
    pub(crate) max_age: Option<Duration>,
    pub(crate) secure: bool,
    pub(crate) same_site: SameSite,
}

impl SessionConfig {
    pub fn new(secret: impl Into<Vec<u8>>, cookie_name: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            cookie_name: cookie_name.into(),
            path: "/".to_owned(),
            max_age: None,
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets `Max-Age` on the cookie and rejects cookies issued longer ago.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }
}

// ── Session handle ────────────────────────────────────────────────────────────

/// Request-scoped session values.
///
/// Cloning yields another handle to the same state. Values are stored as JSON
/// and read back into any deserializable type.
#[derive(Clone, Default)]
pub struct Session(Arc<Mutex<State>>);

#[derive(Default)]
struct State {
    values: Map<String, Value>,
    dirty: bool,
}

impl Session {
    fn from_values(values: Map<String, Value>) -> Self {
        Self(Arc::new(Mutex::new(State { values, dirty: false })))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads `key` as `T`. `None` if absent or not representable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.state().values.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    /// Raw JSON value for `key`.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.state().values.get(key).cloned()
    }

    /// Stores `value` under `key` and marks the session for re-emission.
    pub fn insert<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        let mut state = self.state();
        state.values.insert(key.into(), value);
        state.dirty = true;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.state();
        state.dirty = true;
        state.values.remove(key)
    }

    /// Drops every value; the next response carries an empty session cookie.
    pub fn clear(&self) {
        let mut state = self.state();
        state.values.clear();
        state.dirty = true;
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state().values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().values.is_empty()
    }

    /// True once any write happened during this request.
    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }
}

impl Request {
    /// The current session, when the router was built with sessions enabled.
    pub fn session(&self) -> Option<Session> {
        self.get::<Session>().cloned()
    }
}

// ── Session layer ─────────────────────────────────────────────────────────────

struct Manager {
    codec: Codec,
    config: SessionConfig,
}

impl Manager {
    fn load(&self, req: &Request) -> Session {
        let now = unix_now();
        let raw = req
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == self.config.cookie_name);

        let Some(raw) = raw else {
            return Session::default();
        };

        match self.codec.decode(raw.value(), now) {
            Some(values) => Session::from_values(values),
            None => {
                debug!(cookie = %self.config.cookie_name, "discarding unverifiable session cookie");
                Session::default()
            }
        }
    }

    fn store(&self, session: &Session, res: &mut Response) {
        let encoded = {
            let state = session.state();
            self.codec.encode(&state.values, unix_now())
        };
        let value = match encoded {
            Ok(v) => v,
            Err(e) => {
                error!("session encode failed: {e}");
                return;
            }
        };

        let mut cookie = Cookie::build((self.config.cookie_name.clone(), value))
            .path(self.config.path.clone())
            .http_only(true)
            .secure(self.config.secure)
            .same_site(self.config.same_site);
        if let Some(max_age) = self.config.max_age {
            let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            cookie = cookie.max_age(cookie::time::Duration::seconds(secs));
        }

        match HeaderValue::try_from(cookie.build().to_string()) {
            Ok(header) => {
                res.headers_mut().append(SET_COOKIE, header);
            }
            Err(e) => error!("session cookie is not a valid header: {e}"),
        }
    }
}

/// The session middleware: loads the session before the chain runs and
/// re-emits the cookie afterwards if the session was written.
pub(crate) fn manager(config: SessionConfig) -> Middleware {
    let manager = Arc::new(Manager { codec: Codec::new(&config.secret, config.max_age), config });
    from_fn(move |mut req: Request, next: Next| {
        let manager = Arc::clone(&manager);
        async move {
            let session = manager.load(&req);
            req.insert(session.clone());
            let mut res = next.run(req).await;
            if session.is_dirty() {
                manager.store(&session, &mut res);
            }
            res
        }
    })
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
