//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses, and response decoration without coupling handlers
//! to infrastructure concerns. The innermost layer is always a [`Router`].
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain.
//! - [`Pipeline`]: an ordered middleware stack in front of a router.
//! - [`LoggerMiddleware`]: request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Router};

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`Next::run`], so each middleware can forward a
/// request at most once. Once every middleware has run, the router
/// dispatches the request.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
    endpoint: Arc<Router>,
}

impl Next {
    /// Invokes the next middleware, or the router once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => self.endpoint.dispatch(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] directly, or decorate the downstream response.
/// Implementations must not hold `&mut` references to shared state across an
/// `.await` point.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack terminating in a [`Router`].
///
/// Middleware runs in the order it was added: the first one added sees the
/// request first and the response last.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use taskbell::{Router, middleware::{LoggerMiddleware, Pipeline}};
///
/// let pipeline = Pipeline::new(Router::new()).with(LoggerMiddleware);
/// let pipeline = Arc::new(pipeline);
/// # let _ = pipeline;
/// ```
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Vec::new().into(),
            endpoint: Arc::new(router),
        }
    }

    /// Appends a middleware to the stack.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        let mut stack = self.middlewares.to_vec();
        stack.push(from_middleware(Arc::new(middleware)));
        self.middlewares = stack.into();
        self
    }

    /// Runs a request through every middleware and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        };
        next.run(Context::new(request)).await
    }
}

/// Logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes.
/// Never short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let status = response.status().as_u16();
            tracing::info!(
                %method,
                %path,
                status,
                elapsed = ?start.elapsed(),
                "request handled"
            );

            response
        })
    }
}
