//! HTTP handlers and the route table.
//!
//! Handlers are plain `async fn(Arc<App>, Context) -> Result<Response, ApiError>`;
//! [`routes`] binds each one to the shared [`App`] and turns its error into a
//! JSON response. Every handler awaits its store writes before responding.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::app::App;
use crate::context::Context;
use crate::error::{ApiError, respond};
use crate::router::Router;
use crate::tasks::{Task, TaskId, UserId};
use crate::Response;

mod auth;
mod notifications;
mod tasks;

type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

fn bind<F, Fut>(app: &Arc<App>, handler: F) -> impl Fn(Context) -> BoxResponse + Send + Sync + 'static
where
    F: Fn(Arc<App>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ApiError>> + Send + 'static,
{
    let app = Arc::clone(app);
    move |ctx| {
        let fut = handler(Arc::clone(&app), ctx);
        Box::pin(async move { respond(fut.await) })
    }
}

pub fn routes(app: &Arc<App>) -> Router {
    let mut router = Router::new();

    router.post("/api/auth/create", bind(app, auth::create));
    router.post("/api/auth/login", bind(app, auth::login));
    router.delete("/api/auth/logout", bind(app, auth::logout));
    router.get("/api/user/me", bind(app, auth::me));
    router.delete("/api/user/me", bind(app, auth::delete_me));

    router.get("/api/tasks", bind(app, tasks::list));
    router.post("/api/tasks", bind(app, tasks::create));
    router.get("/api/tasks/:id", bind(app, tasks::get));
    router.patch("/api/tasks/:id", bind(app, tasks::update));
    router.delete("/api/tasks/:id", bind(app, tasks::delete));
    router.post("/api/tasks/:id/complete", bind(app, tasks::complete));

    router.post("/api/notifications/test", bind(app, notifications::test));
    router.get("/api/health", bind(app, notifications::health));
    router.get("/ws", bind(app, notifications::socket));

    router
}

/// Parses a JSON body that may be omitted entirely.
fn optional_json<T>(ctx: &Context) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if ctx.request().body().iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(ctx.json()?)
}

fn task_id(ctx: &Context) -> Result<TaskId, ApiError> {
    ctx.params()
        .get("id")
        .map(TaskId::from)
        .ok_or(ApiError::NotFound("task"))
}

/// Loads a task the caller owns. Someone else's task reads as missing.
async fn owned_task(app: &App, owner: &UserId, id: &TaskId) -> Result<Task, ApiError> {
    match app.tasks.find_one(id).await? {
        Some(task) if &task.owner_id == owner => Ok(task),
        _ => Err(ApiError::NotFound("task")),
    }
}
