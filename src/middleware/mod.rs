//! Middleware layer.
//!
//! A [`Middleware`] turns the next handler into a wrapping handler. Given a
//! stack `[m1, m2, m3]` and a leaf `h`, the route runs `m1(m2(m3(h)))`:
//! pre-logic top to bottom, then the leaf, then post-logic bottom to top.
//!
//! Most middleware is written with [`from_fn`]:
//!
//! ```rust
//! use trellis::middleware::{self, Next};
//! use trellis::{Request, Response};
//!
//! let timing = middleware::from_fn(|req: Request, next: Next| async move {
//!     let mut res: Response = next.run(req).await;
//!     res.headers_mut().insert("x-served-by", "trellis".parse().unwrap());
//!     res
//! });
//! ```
//!
//! Three layers are not user-registered: the access [`logger`], the panic
//! [`recover`]y boundary and, when configured, the session layer. They wrap
//! the whole dispatch, misses included.

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub mod logger;
pub mod recover;

/// A shared `next handler → wrapping handler` transformation.
pub type Middleware = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static>;

/// The rest of the chain, handed to a [`from_fn`] middleware.
pub struct Next(BoxedHandler);

impl Next {
    /// Runs the remaining middleware and the leaf handler.
    pub async fn run(self, req: Request) -> Response {
        self.0.call(req).await
    }
}

/// Builds a middleware from an async function of the request and the rest
/// of the chain.
pub fn from_fn<F, Fut, R>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next| Arc::new(FromFn { f: Arc::clone(&f), next }) as BoxedHandler)
}

struct FromFn<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F, Fut, R> ErasedHandler for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.f)(req, Next(Arc::clone(&self.next)));
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Makes `value` available to everything further down the chain through
/// [`Request::get`].
///
/// ```rust
/// # use trellis::{middleware, Request, Router};
/// #[derive(Clone)]
/// struct Greeting(&'static str);
///
/// let mut router = Router::new();
/// router.use_middleware(middleware::provide(Greeting("hi")));
/// router.handle("GET /{$}", |req: Request| async move {
///     req.get::<Greeting>().map_or("none", |g| g.0)
/// });
/// ```
pub fn provide<T>(value: T) -> Middleware
where
    T: Clone + Send + Sync + 'static,
{
    from_fn(move |mut req: Request, next: Next| {
        req.insert(value.clone());
        next.run(req)
    })
}

/// Wraps `leaf` in `stack`, first element outermost.
pub(crate) fn chain(stack: &[Middleware], leaf: BoxedHandler) -> BoxedHandler {
    stack.iter().rev().fold(leaf, |next, m| m(next))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::handler::Handler;

    fn request() -> Request {
        let (parts, ()) = http::Request::new(()).into_parts();
        Request::from_parts(parts, Bytes::new())
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
        let log = Arc::clone(log);
        from_fn(move |req: Request, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{name}:in"));
                let res = next.run(req).await;
                log.lock().unwrap().push(format!("{name}:out"));
                res
            }
        })
    }

    #[tokio::test]
    async fn first_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let leaf_log = Arc::clone(&log);
        let leaf = (move |_req: Request| {
            let log = Arc::clone(&leaf_log);
            async move {
                log.lock().unwrap().push("leaf".to_owned());
                "done"
            }
        })
        .into_boxed_handler();

        let handler = chain(&[record(&log, "a"), record(&log, "b")], leaf);
        let res = handler.call(request()).await;

        assert_eq!(res.body(), b"done");
        assert_eq!(*log.lock().unwrap(), ["a:in", "b:in", "leaf", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn provide_exposes_typed_value() {
        #[derive(Clone)]
        struct Tenant(u32);

        let leaf = (|req: Request| async move {
            format!("tenant {}", req.get::<Tenant>().map_or(0, |t| t.0))
        })
        .into_boxed_handler();

        let res = chain(&[provide(Tenant(7))], leaf).call(request()).await;
        assert_eq!(res.body(), b"tenant 7");
    }
}
