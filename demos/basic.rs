//! Minimal trellis example: groups, middleware, sessions and a custom 404.
//!
//! Run with:
//!   APP_ENV=development cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -i http://localhost:3000/api/v1/users/42
//!   curl -i -c jar -b jar -X POST http://localhost:3000/visits
//!   curl -i http://localhost:3000/boom
//!   curl -i http://localhost:3000/nowhere

use http::StatusCode;
use trellis::middleware::{self, Next};
use trellis::{Error, Options, Request, RequestHead, Response, Router, Server};

#[derive(Clone)]
struct ApiVersion(&'static str);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut router = Router::with_options(
        Options::new()
            .session("demo-secret-change-me", "trellis_demo")
            .error_handler(StatusCode::NOT_FOUND, not_found),
    );

    router.handle("GET /{$}", |_req: Request| async { "Hello, World!" });
    router.handle("POST /visits", count_visit);
    router.handle("GET /boom", |_req: Request| async {
        let empty: Vec<&str> = Vec::new();
        Response::text(empty[3])
    });

    router.group("/api/", |api| {
        api.use_middleware(middleware::from_fn(|req: Request, next: Next| async move {
            let mut res = next.run(req).await;
            if let Ok(v) = "no-store".parse() {
                res.headers_mut().insert("cache-control", v);
            }
            res
        }));

        api.group("/v1/", |v1| {
            v1.use_middleware(middleware::provide(ApiVersion("v1")));
            v1.handle("GET /users/{id}", get_user);
        });
    });

    Server::bind("0.0.0.0:3000")
        .serve(router.handler())
        .await
        .expect("server error");
}

fn not_found(head: &RequestHead, _err: &Error) -> Response {
    Response::text(format!("nothing at {}", head.path))
}

// GET /api/v1/users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    let version = req.get::<ApiVersion>().map_or("?", |v| v.0);
    Response::json(format!(r#"{{"id":"{id}","api":"{version}"}}"#).into_bytes())
}

// POST /visits: the session cookie is re-issued because the session changed.
async fn count_visit(req: Request) -> Result<String, Error> {
    let Some(session) = req.session() else {
        return Err(Error::msg("sessions are not enabled"));
    };
    let visits = session.get::<u64>("visits").unwrap_or(0) + 1;
    session.insert("visits", visits)?;
    Ok(format!("visit #{visits}"))
}
