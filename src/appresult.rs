use axum::{http::{header, StatusCode}, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::ChatError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        let Some(err) = self.0.downcast_ref::<ChatError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };

        use ChatError::*;
        match err {
            NotFound(_) => StatusCode::NOT_FOUND,
            Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Forbidden(_) => StatusCode::FORBIDDEN,
            InvalidOperation(_) | AlreadyMember | NotMember | Conflict(_) => StatusCode::CONFLICT,
            Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let chat_err = self.0.downcast_ref::<ChatError>();
        let kind = chat_err.map_or("internal", ChatError::kind);
        let retryable = chat_err.is_some_and(ChatError::is_retryable);

        if status.is_server_error() {
            tracing::error!("{}\n\n{}", self.0, self.0.backtrace());
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": kind,
            "retryable": retryable,
        }));

        if retryable {
            (status, [(header::RETRY_AFTER, "5")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_pick_their_status() {
        let cases = [
            (ChatError::not_found("room"), StatusCode::NOT_FOUND),
            (ChatError::validation("empty"), StatusCode::UNPROCESSABLE_ENTITY),
            (ChatError::Unauthenticated("no token".into()), StatusCode::UNAUTHORIZED),
            (ChatError::Forbidden("edit".into()), StatusCode::FORBIDDEN),
            (ChatError::AlreadyMember, StatusCode::CONFLICT),
            (ChatError::from(sqlx::Error::PoolClosed), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn other_errors_are_internal() {
        let err = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unavailable_carries_retry_after() {
        let res = AppError::from(ChatError::from(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(res.headers().contains_key(header::RETRY_AFTER));
    }
}
