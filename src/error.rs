//! Request-layer error taxonomy and its mapping onto HTTP responses.

use serde::Serialize;
use thiserror::Error;

use crate::http::{Response, StatusCode};
use crate::realtime::RealtimeError;
use crate::security::PasswordError;
use crate::store::StoreError;
use crate::tasks::TaskError;

/// Errors a handler can return. Every variant maps to exactly one status code
/// and a JSON body of the form `{ "error": "<message>" }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("malformed JSON body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("expected a WebSocket upgrade request")]
    UpgradeRequired,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::MalformedBody(_) => StatusCode::BadRequest,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::Unauthorized,
            ApiError::NotFound(_) => StatusCode::NotFound,
            ApiError::Conflict(_) => StatusCode::Conflict,
            ApiError::Unprocessable(_) => StatusCode::UnprocessableEntity,
            ApiError::UpgradeRequired => StatusCode::UpgradeRequired,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NotFound,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::Conflict,
            ApiError::Store(StoreError::Backend(_)) => StatusCode::InternalServerError,
            ApiError::Realtime(RealtimeError::Handshake(_)) => StatusCode::BadRequest,
            ApiError::Realtime(RealtimeError::Encode(_)) => StatusCode::InternalServerError,
            ApiError::Password(_) => StatusCode::InternalServerError,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::InternalServerError {
            tracing::error!(error = %self, "request failed");
            return Response::json(
                status,
                &ErrorBody {
                    error: "internal server error",
                },
            );
        }
        let message = self.to_string();
        Response::json(status, &ErrorBody { error: &message })
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::EmptyTitle => ApiError::BadRequest(err.to_string()),
            TaskError::UnknownFrequency(_) | TaskError::InvalidDueDate(_) => {
                ApiError::Unprocessable(err.to_string())
            }
        }
    }
}

/// Collapses a handler result into a response.
pub fn respond(result: Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(ApiError::into_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_status() {
        let err: ApiError = StoreError::NotFound("task".into()).into();
        assert_eq!(err.status(), StatusCode::NotFound);
        let err: ApiError = StoreError::Conflict("email taken".into()).into();
        assert_eq!(err.status(), StatusCode::Conflict);
    }

    #[test]
    fn backend_failures_do_not_leak_details() {
        let res = ApiError::Store(StoreError::Backend("disk on fire".into())).into_response();
        assert_eq!(res.status(), StatusCode::InternalServerError);
        let body = String::from_utf8(res.body_ref().to_vec()).unwrap();
        assert!(!body.contains("disk"));
    }

    #[test]
    fn task_validation_statuses() {
        assert_eq!(ApiError::from(TaskError::EmptyTitle).status(), StatusCode::BadRequest);
        let err = ApiError::from(TaskError::UnknownFrequency("hourly".into()));
        assert_eq!(err.status(), StatusCode::UnprocessableEntity);
    }

    #[test]
    fn body_is_json_error_object() {
        let res = ApiError::BadRequest("title required".into()).into_response();
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(res.body_ref(), br#"{"error":"title required"}"#);
    }
}
