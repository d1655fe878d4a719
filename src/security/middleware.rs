//! Resolves the session cookie into a [`Principal`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{Principal, SESSION_COOKIE, SessionStore};
use crate::{
    Response,
    context::Context,
    middleware::{Middleware, Next},
};

/// Looks up the `token` cookie and, when it names a live session, attaches a
/// [`Principal`] to the request extensions.
///
/// Requests without a valid session pass through untouched; rejecting them is
/// left to the handlers that need a user (see [`super::principal`]).
pub struct SessionMiddleware {
    sessions: Arc<SessionStore>,
}

impl SessionMiddleware {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Middleware for SessionMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let sessions = Arc::clone(&self.sessions);

        Box::pin(async move {
            let token = ctx.request().cookie(SESSION_COOKIE).map(str::to_owned);
            if let Some(token) = token {
                match sessions.resolve(&token).await {
                    Some(user_id) => {
                        ctx.extensions_mut().insert(Principal { user_id, token });
                    }
                    None => tracing::debug!("request carried an unknown session token"),
                }
            }
            next.run(ctx).await
        })
    }
}
