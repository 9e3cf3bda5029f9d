use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    db::{Message, Room},
    live::Broadcaster,
    AppResult, ChatError, ChatResult,
};

use super::{
    directory::{self, ParticipantList, PrivateRoomSummary, PublicRoomSummary},
    membership,
    msg::{self, SendMessageQuery},
    store, EmptyRoomPolicy,
};

#[derive(Debug, Deserialize)]
pub(crate) struct EditMessageQuery {
    content: String,
}

/// Private rooms are only visible to their two participants.
async fn visible_room(db_pool: &SqlitePool, room_id: Uuid, user_id: &str) -> ChatResult<Room> {
    let room = store::find_room(db_pool, room_id).await?;
    if !room.is_group && !room.has_participant(user_id) {
        return Err(ChatError::Forbidden("this private room is not yours".into()));
    }
    Ok(room)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Room>> {
    Ok(Json(visible_room(&db_pool, room_id, &user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_room(
    State(db_pool): State<SqlitePool>,
    State(live): State<Arc<Broadcaster>>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let room = store::find_room(&db_pool, room_id).await?;
    if !room.has_participant(&user_id) {
        return Err(ChatError::Forbidden("only participants can delete a room".into()).into());
    }

    store::delete_room(&db_pool, room_id).await?;
    live.close_room(room_id);
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn participants(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<ParticipantList>> {
    visible_room(&db_pool, room_id, &user_id).await?;
    Ok(Json(directory::list_participants(&db_pool, room_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    visible_room(&db_pool, room_id, &user_id).await?;
    Ok(Json(msg::list_history(&db_pool, room_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_message(
    State(db_pool): State<SqlitePool>,
    State(live): State<Arc<Broadcaster>>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    Json(query): Json<SendMessageQuery>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = msg::send_msg(&db_pool, &live, &user_id, room_id, query).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn edit_message(
    State(db_pool): State<SqlitePool>,
    State(live): State<Arc<Broadcaster>>,
    CurrentUser(user_id): CurrentUser,
    Path(message_id): Path<Uuid>,
    Json(EditMessageQuery { content }): Json<EditMessageQuery>,
) -> AppResult<Json<Message>> {
    Ok(Json(msg::edit_msg(&db_pool, &live, &user_id, message_id, &content).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join_room(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Room>> {
    Ok(Json(membership::join(&db_pool, room_id, &user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn leave_room(
    State(db_pool): State<SqlitePool>,
    State(live): State<Arc<Broadcaster>>,
    State(policy): State<EmptyRoomPolicy>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let deleted = membership::leave(&db_pool, room_id, &user_id, policy).await?;
    if deleted {
        live.close_room(room_id);
    }
    Ok(Json(json!({ "room_id": room_id, "deleted": deleted })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_read(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    visible_room(&db_pool, room_id, &user_id).await?;
    let marked = msg::mark_read(&db_pool, room_id, &user_id).await?;
    Ok(Json(json!({ "room_id": room_id, "marked": marked })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn unread(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    visible_room(&db_pool, room_id, &user_id).await?;
    let unread_count = msg::unread_count(&db_pool, room_id, &user_id).await?;
    Ok(Json(json!({ "room_id": room_id, "unread_count": unread_count })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn private_rooms(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<Vec<PrivateRoomSummary>>> {
    Ok(Json(directory::list_private_rooms_for(&db_pool, &user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn public_rooms(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<Vec<PublicRoomSummary>>> {
    Ok(Json(directory::list_public_rooms(&db_pool, &user_id).await?))
}
