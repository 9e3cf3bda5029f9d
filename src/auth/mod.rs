//! Identity comes from the upstream auth service: it authenticates the user
//! and hands the client a signed token, which `POST /session` exchanges for a
//! session cookie.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tower_sessions::Session;

use crate::{session::USER_ID, AppError, AppState};

mod lockin;
mod logout;
mod token;

pub use lockin::lockin;
pub use logout::logout;
pub use token::{Claims, TokenVerifier};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(lockin))
        .route("/logout", post(logout))
}

/// The authenticated user of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        match session.get::<String>(USER_ID).await {
            Ok(Some(user_id)) => Ok(CurrentUser(user_id)),
            Ok(None) => Err((StatusCode::UNAUTHORIZED, "not signed in").into_response()),
            Err(e) => Err(AppError::from(e).into_response()),
        }
    }
}
