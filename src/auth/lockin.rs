use axum::{
    debug_handler,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use tower_sessions::Session;

use crate::{session::USER_ID, AppResult, ChatError};

use super::TokenVerifier;

#[derive(Serialize)]
pub struct LockinResponse {
    pub user_id: String,
}

/// Binds the user vouched for by the upstream's bearer token to this session.
#[debug_handler(state = crate::AppState)]
pub async fn lockin(
    State(verifier): State<TokenVerifier>,
    session: Session,
    headers: HeaderMap,
) -> AppResult<Json<LockinResponse>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ChatError::Unauthenticated("missing bearer token".into()))?;
    let user_id = verifier.verify(token.trim())?;

    session.cycle_id().await?;
    session.insert(USER_ID, &user_id).await?;

    tracing::info!("welcome u/{user_id}");
    Ok(Json(LockinResponse { user_id }))
}
