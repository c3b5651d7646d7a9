//! Panic recovery boundary.
//!
//! Every request runs inside [`CatchPanic`]: each poll of the handler future
//! happens under `catch_unwind`, so a panic anywhere below this layer turns
//! into an [`Error::Panic`] rendered by the registered `500` handler instead
//! of tearing down the connection task.
//!
//! The `500` renderer runs under the same guard. A custom renderer that
//! panics is replaced by the built-in page for that request.
//!
//! While a recover scope is active on the current thread, the process panic
//! hook records the panic location and a backtrace instead of printing them.
//! In [`Mode::Development`] that trace is written to the diagnostics sink
//! (stderr by default); in any other mode it is dropped.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::task::{Context, Poll};

use http::StatusCode;

use super::Middleware;
use crate::config::Mode;
use crate::error::Error;
use crate::errors::ErrorHandlers;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

thread_local! {
    static SCOPE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Where recovered panic traces go in development mode.
#[derive(Clone)]
pub struct Diagnostics(Arc<Mutex<Box<dyn Write + Send>>>);

impl Diagnostics {
    /// The process's standard error stream.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    fn emit(&self, panic: &Panic) {
        let mut out = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let trace = panic.trace.as_deref().unwrap_or("<no trace captured>");
        // A failing diagnostics stream must not turn into a second failure.
        let _ = writeln!(out, "recovered from panic: {}\n{trace}", panic.message);
        let _ = out.flush();
    }
}

impl Default for Diagnostics {
    fn default() -> Self { Self::stderr() }
}

/// A caught panic: its message and, if the hook saw it, the trace.
#[derive(Debug)]
pub(crate) struct Panic {
    pub(crate) message: String,
    pub(crate) trace: Option<String>,
}

impl Panic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_owned()
        };
        Self { message, trace: LAST_TRACE.with(|t| t.borrow_mut().take()) }
    }
}

/// Installs the trace-capturing panic hook once per process. Panics outside a
/// recover scope still reach the previously installed hook.
pub(crate) fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if SCOPE_DEPTH.with(Cell::get) > 0 {
                let trace = format!("{info}\n{}", Backtrace::force_capture());
                LAST_TRACE.with(|t| *t.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

struct Scope;

impl Scope {
    fn enter() -> Self {
        SCOPE_DEPTH.with(|d| d.set(d.get() + 1));
        Scope
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        SCOPE_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

/// Runs `f` inside a recover scope, converting a panic into `Err(Panic)`.
fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, Panic> {
    let _scope = Scope::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Panic::from_payload)
}

/// Future adapter that converts a panic during any poll into `Err(Panic)`.
pub(crate) struct CatchPanic {
    inner: BoxFuture,
}

impl CatchPanic {
    pub(crate) fn new(inner: BoxFuture) -> Self {
        Self { inner }
    }
}

impl Future for CatchPanic {
    type Output = Result<Response, Panic>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        match guarded(|| inner.as_mut().poll(cx)) {
            Ok(Poll::Ready(res)) => Poll::Ready(Ok(res)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(panic) => Poll::Ready(Err(panic)),
        }
    }
}

/// The recovery middleware. Installed on every router just inside the access log.
pub(crate) fn recoverer(mode: Mode, diagnostics: Diagnostics, errors: Arc<ErrorHandlers>) -> Middleware {
    install_panic_hook();
    Arc::new(move |next: BoxedHandler| {
        Arc::new(Recover {
            next,
            mode,
            diagnostics: diagnostics.clone(),
            errors: Arc::clone(&errors),
        }) as BoxedHandler
    })
}

struct Recover {
    next: BoxedHandler,
    mode: Mode,
    diagnostics: Diagnostics,
    errors: Arc<ErrorHandlers>,
}

impl ErasedHandler for Recover {
    fn call(&self, req: Request) -> BoxFuture {
        let head = req.head().clone();
        let next = Arc::clone(&self.next);
        // The inner call happens on first poll so synchronous panics are caught too.
        let caught = CatchPanic::new(Box::pin(async move { next.call(req).await }));
        let mode = self.mode;
        let diagnostics = self.diagnostics.clone();
        let errors = Arc::clone(&self.errors);

        Box::pin(async move {
            match caught.await {
                Ok(res) => res,
                Err(panic) => {
                    if mode.is_development() {
                        diagnostics.emit(&panic);
                    }
                    let err = Error::Panic(panic.message);
                    match guarded(|| errors.render(StatusCode::INTERNAL_SERVER_ERROR, &head, &err)) {
                        Ok(res) => res,
                        Err(renderer) => {
                            if mode.is_development() {
                                diagnostics.emit(&renderer);
                            }
                            Response::error(StatusCode::INTERNAL_SERVER_ERROR, Error::Panic(renderer.message))
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use bytes::Bytes;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::chain;

    #[derive(Clone, Default)]
    struct Sink(Arc<StdMutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn request() -> Request {
        let (parts, ()) = http::Request::new(()).into_parts();
        Request::from_parts(parts, Bytes::new())
    }

    async fn boom(_req: Request) -> Response {
        let empty: Vec<&str> = Vec::new();
        Response::text(empty[1])
    }

    async fn run(mode: Mode, sink: &Sink) -> Response {
        let mw = recoverer(mode, Diagnostics::new(sink.clone()), Arc::new(ErrorHandlers::default()));
        chain(&[mw], boom.into_boxed_handler()).call(request()).await
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let sink = Sink::default();
        let res = run(Mode::Production, &sink).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8_lossy(res.body());
        assert!(body.contains("index out of bounds"), "body: {body}");
    }

    #[tokio::test]
    async fn trace_only_written_in_development() {
        let sink = Sink::default();
        run(Mode::Production, &sink).await;
        assert!(sink.contents().is_empty());

        run(Mode::Development, &sink).await;
        let out = sink.contents();
        assert!(out.contains("recovered from panic: index out of bounds"), "diagnostics: {out}");
        assert!(out.contains("panicked at"), "diagnostics: {out}");
    }

    #[tokio::test]
    async fn panicking_error_page_falls_back_to_builtin() {
        let sink = Sink::default();
        let mut overrides: HashMap<StatusCode, crate::errors::ErrorHandler> = HashMap::new();
        overrides.insert(
            StatusCode::INTERNAL_SERVER_ERROR,
            Arc::new(|_: &crate::request::RequestHead, _: &Error| -> Response { panic!("renderer broke") }),
        );
        let mw = recoverer(Mode::Development, Diagnostics::new(sink.clone()), Arc::new(ErrorHandlers::new(overrides)));

        let res = chain(&[mw], boom.into_boxed_handler()).call(request()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"renderer broke\n");
        assert!(sink.contents().contains("recovered from panic: renderer broke"));
    }

    #[tokio::test]
    async fn synchronous_panic_is_caught() {
        let sink = Sink::default();
        let mw = recoverer(Mode::Production, Diagnostics::new(sink.clone()), Arc::new(ErrorHandlers::default()));
        let leaf = (|_req: Request| -> std::future::Ready<&'static str> { panic!("before the future") })
            .into_boxed_handler();
        let res = chain(&[mw], leaf).call(request()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"before the future\n");
    }
}
