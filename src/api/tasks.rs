use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;

use super::{optional_json, owned_task, task_id};
use crate::app::App;
use crate::context::Context;
use crate::error::ApiError;
use crate::security::principal;
use crate::store::TaskFilter;
use crate::tasks::{NewTask, TaskPatch, TaskUpdate};
use crate::{Response, StatusCode};

pub(super) async fn list(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let tasks = app.tasks.find_all(&TaskFilter::owned_by(owner)).await?;
    Ok(Response::json(StatusCode::Ok, &tasks))
}

pub(super) async fn create(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let task = ctx.json::<NewTask>()?.into_task(owner, Utc::now())?;
    app.tasks.insert(task.clone()).await?;
    tracing::info!(task_id = %task.id, user_id = %task.owner_id, "task created");
    Ok(Response::json(StatusCode::Created, &task))
}

pub(super) async fn get(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let task = owned_task(&app, &owner, &task_id(&ctx)?).await?;
    Ok(Response::json(StatusCode::Ok, &task))
}

pub(super) async fn update(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let id = task_id(&ctx)?;
    let update: TaskUpdate = ctx.json()?;

    let current = owned_task(&app, &owner, &id).await?;
    let patch = update.into_patch(&current, Utc::now())?;
    app.tasks.update_fields(&id, patch).await?;

    let task = owned_task(&app, &owner, &id).await?;
    Ok(Response::json(StatusCode::Ok, &task))
}

pub(super) async fn delete(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let id = task_id(&ctx)?;
    owned_task(&app, &owner, &id).await?;
    app.tasks.delete_one(&id).await?;
    tracing::info!(task_id = %id, user_id = %owner, "task deleted");
    Ok(Response::new(StatusCode::NoContent))
}

#[derive(Debug, Default, Deserialize)]
struct Completion {
    date: Option<NaiveDate>,
}

/// Records a completion for `date`, today by default. Repeats are no-ops.
pub(super) async fn complete(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let owner = principal(&ctx)?.user_id.clone();
    let id = task_id(&ctx)?;
    let date = optional_json::<Completion>(&ctx)?
        .date
        .unwrap_or_else(|| Local::now().date_naive());

    let mut task = owned_task(&app, &owner, &id).await?;
    if !task.completed_dates.contains(&date) {
        // The append is decided under the store lock, so concurrent completions
        // of the same task never overwrite each other.
        app.tasks
            .update_fields(&id, TaskPatch::completed_on(date, Utc::now()))
            .await?;
        task = owned_task(&app, &owner, &id).await?;
    }
    Ok(Response::json(StatusCode::Ok, &task))
}
