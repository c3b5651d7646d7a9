//! Frozen dispatch table.
//!
//! One slot per HTTP method plus one for method-less routes. A slot is a
//! stack of radix trees: a key that its tree cannot hold next to the keys
//! already there (a catch-all beside a capture, two capture names at one
//! position) opens the next tree of the slot. A request is looked up in
//! every tree of its method's slot (and the `GET` slot for `HEAD`) and of
//! the method-less slot; the most specific match wins, and on a tie the
//! method-qualified route wins. No match renders the `404` error handler.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use matchit::{InsertError, Router as MatchitRouter};
use tracing::{debug, warn};

use crate::error::Error;
use crate::errors::ErrorHandlers;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware;
use crate::pattern::{SUBTREE_PARAM, Specificity, TreeKey};
use crate::request::Request;
use crate::response::{Response, ResponseBody};
use crate::router::{Base, Route};

/// The single entry point for live traffic.
///
/// Immutable and cheap to clone; every connection task holds a clone.
#[derive(Clone)]
pub struct App {
    entry: BoxedHandler,
    errors: Arc<ErrorHandlers>,
}

#[derive(Clone)]
struct Entry {
    handler: BoxedHandler,
    specificity: Specificity,
    empty_capture: Option<String>,
}

#[derive(Default)]
struct Slot {
    trees: Vec<MatchitRouter<Entry>>,
}

struct Table {
    by_method: HashMap<Method, Slot>,
    any: Slot,
}

/// One tree key waiting to be inserted, with the pattern it came from.
struct Pending {
    slot: Option<Method>,
    key: TreeKey,
    entry: Entry,
    source: String,
}

impl App {
    pub(crate) fn freeze(routes: &[Route], base: &Base) -> Self {
        let mut pending: Vec<Pending> = Vec::new();
        let mut index: HashMap<(Option<Method>, String), usize> = HashMap::new();

        for route in routes {
            for key in &route.pattern.keys {
                let next = Pending {
                    slot: route.pattern.method.clone(),
                    key: key.clone(),
                    entry: Entry {
                        handler: Arc::clone(&route.handler),
                        specificity: route.pattern.specificity(key),
                        empty_capture: key.empty_capture.clone(),
                    },
                    source: route.pattern.to_string(),
                };

                match index.get(&(next.slot.clone(), key.shape.clone())) {
                    None => {
                        index.insert((next.slot.clone(), key.shape.clone()), pending.len());
                        pending.push(next);
                    }
                    Some(&i) => {
                        let existing = &mut pending[i];
                        match (existing.key.companion, next.key.companion) {
                            (true, false) => *existing = next,
                            (false, true) => {}
                            _ => panic!("pattern `{}` conflicts with `{}`", next.source, existing.source),
                        }
                    }
                }
            }
        }

        let mut table = Table { by_method: HashMap::new(), any: Slot::default() };
        for p in pending {
            let slot = match p.slot {
                Some(method) => table.by_method.entry(method).or_default(),
                None => &mut table.any,
            };
            slot.insert(&p.key.route, p.entry)
                .unwrap_or_else(|e| panic!("invalid route `{}`: {e}", p.source));
        }

        debug!(routes = routes.len(), "route table frozen");

        let dispatch: BoxedHandler = Arc::new(Dispatch {
            table: Arc::new(table),
            errors: Arc::clone(&base.errors),
        });

        Self { entry: middleware::chain(&base.outer, dispatch), errors: Arc::clone(&base.errors) }
    }

    /// Handles one request: buffers its body, runs it through the access
    /// log, recovery, session and route layers, and returns the response.
    ///
    /// Never fails; every outcome is a well-formed response.
    pub async fn call<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let req = Request::from_parts(parts, Bytes::new());
                warn!(method = %req.method(), path = req.path(), "request body read failed: {e}");
                let err = Error::Body(e.to_string());
                return self.errors.render(StatusCode::BAD_REQUEST, req.head(), &err).into_http();
            }
        };

        self.serve(Request::from_parts(parts, body)).await.into_http()
    }

    /// Handles an already-buffered request.
    pub async fn serve(&self, req: Request) -> Response {
        self.entry.call(req).await
    }
}

struct Dispatch {
    table: Arc<Table>,
    errors: Arc<ErrorHandlers>,
}

impl ErasedHandler for Dispatch {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.table.resolve(req.method(), req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req)
            }
            None => {
                let res = self.errors.render(StatusCode::NOT_FOUND, req.head(), &Error::NotFound);
                Box::pin(async move { res })
            }
        }
    }
}

impl Slot {
    /// Inserts into the first tree that accepts `route` without a conflict.
    fn insert(&mut self, route: &str, entry: Entry) -> Result<(), InsertError> {
        for tree in &mut self.trees {
            // A rejected insert is tried on a copy so the tree stays as it was.
            let mut candidate = tree.clone();
            match candidate.insert(route, entry.clone()) {
                Ok(()) => {
                    *tree = candidate;
                    return Ok(());
                }
                Err(InsertError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        let mut tree = MatchitRouter::new();
        tree.insert(route, entry)?;
        self.trees.push(tree);
        Ok(())
    }
}

impl Table {
    fn resolve(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let head_as_get = (*method == Method::HEAD).then(|| self.by_method.get(&Method::GET)).flatten();
        let slots = [self.by_method.get(method), head_as_get, Some(&self.any)];

        // Earlier trees win ties, so only a strictly better match replaces.
        let mut best: Option<matchit::Match<'_, '_, &Entry>> = None;
        for tree in slots.into_iter().flatten().flat_map(|slot| &slot.trees) {
            let Ok(found) = tree.at(path) else { continue };
            if best.as_ref().is_none_or(|b| found.value.specificity > b.value.specificity) {
                best = Some(found);
            }
        }

        let found = best?;
        let mut params: HashMap<String, String> = found
            .params
            .iter()
            .filter(|(k, _)| *k != SUBTREE_PARAM)
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        if let Some(name) = &found.value.empty_capture {
            params.insert(name.clone(), String::new());
        }
        Some((Arc::clone(&found.value.handler), params))
    }
}
