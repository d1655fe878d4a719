use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::App;
use crate::context::Context;
use crate::error::ApiError;
use crate::security::{
    Principal, SESSION_COOKIE, expired_session_cookie, hash_password, principal, session_cookie,
    verify_password,
};
use crate::store::{TaskFilter, User};
use crate::tasks::UserId;
use crate::{Response, StatusCode};

#[derive(Debug, Default, Deserialize)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl Credentials {
    fn checked(self) -> Result<(String, String), ApiError> {
        let email = self.email.trim().to_owned();
        if email.is_empty() || self.password.is_empty() {
            return Err(ApiError::BadRequest("email and password are required".into()));
        }
        Ok((email, self.password))
    }
}

#[derive(Serialize)]
struct Account<'a> {
    id: &'a UserId,
    email: &'a str,
}

fn signed_in(status: StatusCode, user: &User, token: &str) -> Response {
    Response::json(
        status,
        &Account {
            id: &user.id,
            email: &user.email,
        },
    )
    .header("Set-Cookie", session_cookie(token))
}

pub(super) async fn create(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let (email, password) = ctx.json::<Credentials>()?.checked()?;
    let user = User {
        id: UserId::generate(),
        email,
        password_hash: hash_password(password).await?,
    };
    app.users.insert_user(user.clone()).await?;
    let token = app.sessions.create(user.id.clone()).await;
    info!(user_id = %user.id, "account created");
    Ok(signed_in(StatusCode::Created, &user, &token))
}

pub(super) async fn login(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let (email, password) = ctx.json::<Credentials>()?.checked()?;
    let user = app
        .users
        .find_user_by_email(&email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(ApiError::InvalidCredentials);
    }
    let token = app.sessions.create(user.id.clone()).await;
    info!(user_id = %user.id, "signed in");
    Ok(signed_in(StatusCode::Ok, &user, &token))
}

pub(super) async fn logout(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    // Without a resolved principal, still drop whatever token the cookie held.
    let token = match ctx.extensions().get::<Principal>() {
        Some(p) => Some(p.token.clone()),
        None => ctx.request().cookie(SESSION_COOKIE).map(str::to_owned),
    };
    if let Some(token) = token {
        app.sessions.revoke(&token).await;
    }
    Ok(Response::new(StatusCode::NoContent).header("Set-Cookie", expired_session_cookie()))
}

pub(super) async fn me(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let user_id = principal(&ctx)?.user_id.clone();
    let user = app
        .users
        .find_user(&user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Response::json(
        StatusCode::Ok,
        &Account {
            id: &user.id,
            email: &user.email,
        },
    ))
}

/// Deletes the account with all of its tasks and sessions, and closes its
/// push channels.
pub(super) async fn delete_me(app: Arc<App>, ctx: Context) -> Result<Response, ApiError> {
    let user_id = principal(&ctx)?.user_id.clone();
    let deleted_tasks = app
        .tasks
        .delete_many(&TaskFilter::owned_by(user_id.clone()))
        .await?;
    app.users.delete_user(&user_id).await?;
    let sessions = app.sessions.revoke_user(&user_id).await;
    let channels = app.registry.drop_user(&user_id).await;
    info!(user_id = %user_id, deleted_tasks, sessions, channels, "account deleted");

    Ok(Response::json(
        StatusCode::Ok,
        &serde_json::json!({ "deletedTasks": deleted_tasks }),
    )
    .header("Set-Cookie", expired_session_cookie()))
}
