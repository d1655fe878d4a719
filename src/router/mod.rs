//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! Two pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params              |
//! |----------------------|----------------------------|------------------------------|
//! | `/api/tasks`         | `/api/tasks`               | *(none)*                     |
//! | `/api/tasks/:id`     | `/api/tasks/42`            | `id → "42"`                  |
//!
//! Trailing slashes are normalized on both patterns and incoming paths. Routes
//! are matched in registration order; the first match wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::error::ApiError;
use crate::{Method, Request, Response};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait via the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    /// Compile a pattern string.
    ///
    /// Any `:` segment makes it parameterized, otherwise exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// When no route matches, a JSON `404` is returned.
///
/// # Examples
///
/// ```rust,no_run
/// use taskbell::context::Context;
/// use taskbell::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/api/tasks/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch a bare request.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request)).await
    }

    /// Dispatch a context that middleware may already have decorated.
    ///
    /// Extensions set upstream are preserved; path params are filled in from
    /// the matching route.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let matched = {
            let request = ctx.request();
            self.routes.iter().find_map(|route| {
                route
                    .matches(request.method(), request.path())
                    .map(|params| (Arc::clone(&route.handler), params))
            })
        };

        match matched {
            Some((handler, params)) => {
                ctx.set_params(params);
                handler(ctx).await
            }
            None => ApiError::NotFound("route").into_response(),
        }
    }
}
