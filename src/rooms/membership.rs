use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    ChatError, ChatResult,
    db::{Room, now_millis},
};

use super::{EmptyRoomPolicy, store};

async fn group_room(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<Room> {
    let Some(room) = store::fetch_room(db_pool, room_id).await? else {
        return Err(ChatError::not_found("room"));
    };
    if !room.is_group {
        return Err(ChatError::InvalidOperation("membership of private rooms is fixed".into()));
    }
    Ok(room)
}

/// Adds `user_id` to a group room and returns the updated room.
pub async fn join(db_pool: &SqlitePool, room_id: Uuid, user_id: &str) -> ChatResult<Room> {
    if user_id.trim().is_empty() {
        return Err(ChatError::validation("user id is required"));
    }
    group_room(db_pool, room_id).await?;
    if store::is_participant(db_pool, room_id, user_id).await? {
        return Err(ChatError::AlreadyMember);
    }

    let mut tx = db_pool.begin().await?;
    sqlx::query(
        r#"
INSERT INTO room_participants (room_id,user_id,position)
SELECT ?, ?, COALESCE(MAX(position) + 1, 0) FROM room_participants WHERE room_id = ?
        "#,
    )
        .bind(room_id)
        .bind(user_id)
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match ChatError::from(e) {
            ChatError::Conflict(_) => ChatError::AlreadyMember,
            other => other,
        })?;
    sqlx::query("UPDATE rooms SET updated_at=? WHERE id=?")
        .bind(now_millis())
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%room_id, user = user_id, "joined group room");
    store::find_room(db_pool, room_id).await
}

/// Removes `user_id` from a group room. Returns true when the policy deleted
/// the room because nobody was left.
pub async fn leave(db_pool: &SqlitePool, room_id: Uuid, user_id: &str, policy: EmptyRoomPolicy) -> ChatResult<bool> {
    group_room(db_pool, room_id).await?;

    let mut tx = db_pool.begin().await?;
    let removed = sqlx::query("DELETE FROM room_participants WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if removed == 0 {
        tx.rollback().await?;
        return Err(ChatError::NotMember);
    }
    sqlx::query("UPDATE rooms SET updated_at=? WHERE id=?")
        .bind(now_millis())
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room_participants WHERE room_id=?")
        .bind(room_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%room_id, user = user_id, remaining, "left group room");

    if remaining == 0 && policy == EmptyRoomPolicy::Delete {
        store::delete_room(db_pool, room_id).await?;
        return Ok(true);
    }
    Ok(false)
}
