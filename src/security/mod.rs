//! Authentication: password hashing, sessions, and the middleware that turns a
//! session cookie into a [`Principal`].
//!
//! Handlers that need a signed-in user call [`principal`]; the middleware
//! itself never rejects a request, so public routes (health, login) share the
//! same pipeline.

pub mod middleware;
pub mod password;
pub mod session;

pub use middleware::SessionMiddleware;
pub use password::{PasswordError, hash_password, verify_password};
pub use session::SessionStore;

use crate::context::Context;
use crate::error::ApiError;
use crate::tasks::UserId;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub token: String,
}

/// Returns the request's principal, or [`ApiError::Unauthorized`].
pub fn principal(ctx: &Context) -> Result<&Principal, ApiError> {
    ctx.extensions()
        .get::<Principal>()
        .ok_or(ApiError::Unauthorized)
}

/// `Set-Cookie` value that installs a session token.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; Secure; SameSite=Strict")
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_session_cookie() -> String {
    format!(
        "{SESSION_COOKIE}=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0"
    )
}
