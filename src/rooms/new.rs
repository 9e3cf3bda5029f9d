use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, db::Room, AppResult};

use super::store;

#[derive(Debug, Deserialize)]
pub(crate) struct NewPrivateRoomQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomQuery {
    name: String,
    #[serde(default)]
    participants: Vec<String>,
    description: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_private_room(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Json(NewPrivateRoomQuery { user_id: other }): Json<NewPrivateRoomQuery>,
) -> AppResult<Json<Room>> {
    let room = store::get_or_create_private_room(&db_pool, &user_id, &other).await?;
    Ok(Json(room))
}

/// Creates a group room; the creator is always its first participant.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Json(NewRoomQuery { name, participants, description }): Json<NewRoomQuery>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let members: Vec<String> = std::iter::once(user_id)
        .chain(participants)
        .collect();

    let room = store::create_group_room(&db_pool, &name, &members, description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(room)))
}
