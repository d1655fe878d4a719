use std::sync::Arc;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

use super::{optional_json, owned_task};
use crate::app::App;
use crate::context::Context;
use crate::due::evaluate_due;
use crate::error::ApiError;
use crate::realtime::{self, Notice};
use crate::security::principal;
use crate::tasks::TaskId;
use crate::{Response, StatusCode};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestRequest {
    task_id: Option<TaskId>,
}

#[derive(Serialize)]
struct TestOutcome {
    delivered: usize,
    due: Option<bool>,
}

/// Pushes a test notice to the caller's open channels. When a task is named,
/// also reports whether it is due right now. Never stamps `lastNotifiedAt`.
pub(super) async fn test(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let request: TestRequest = optional_json(&ctx)?;

    let (notice, due) = match request.task_id {
        Some(id) => {
            let task = owned_task(&app, &owner, &id).await?;
            let due = evaluate_due(&task, &Local::now(), app.config.min_gap());
            let notice = Notice::Test {
                message: format!("Test notification for \"{}\"", task.title),
            };
            (notice, Some(due))
        }
        None => (
            Notice::Test {
                message: "Test notification".into(),
            },
            None,
        ),
    };

    let delivered = app.dispatcher.dispatch(&owner, &notice).await?;
    Ok(Response::json(StatusCode::Ok, &TestOutcome { delivered, due }))
}

/// `GET /ws`: the session is checked before anything is upgraded.
pub(super) async fn socket(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let user_id = principal(&ctx)?.user_id.clone();
    realtime::upgrade(ctx.request(), user_id, Arc::clone(&app.registry))
}

pub(super) async fn health(app: Arc<App>, _ctx: Context) -> Result<Response, ApiError> {
    let connections = app.registry.connections().await;
    Ok(Response::json(
        StatusCode::Ok,
        &serde_json::json!({
            "status": "ok",
            "time": Utc::now(),
            "connections": connections,
        }),
    ))
}
