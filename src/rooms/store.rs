use sqlx::{SqlitePool, sqlite::SqliteExecutor};
use uuid::Uuid;

use crate::{
    ChatError, ChatResult,
    db::{Profile, Room, now_millis},
    profiles::ANONYMOUS,
};

/// Normalized key of an unordered participant pair.
pub(crate) fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    serde_json::json!([lo, hi]).to_string()
}

pub(crate) async fn fetch_room<'e>(db: impl SqliteExecutor<'e>, room_id: Uuid) -> ChatResult<Option<Room>> {
    let room = sqlx::query_as::<_, Room>(
        "SELECT id,name,is_group,description,last_message_id,created_at,updated_at FROM rooms WHERE id=?",
    )
        .bind(room_id)
        .fetch_optional(db)
        .await?;
    Ok(room)
}

pub(crate) async fn participants<'e>(db: impl SqliteExecutor<'e>, room_id: Uuid) -> ChatResult<Vec<Profile>> {
    let participants = sqlx::query_as::<_, Profile>(
        r#"
SELECT p.user_id, COALESCE(pr.name, ?) AS name, pr.avatar
FROM room_participants p
LEFT JOIN profiles pr ON pr.user_id = p.user_id
WHERE p.room_id = ?
ORDER BY p.position
        "#,
    )
        .bind(ANONYMOUS)
        .bind(room_id)
        .fetch_all(db)
        .await?;
    Ok(participants)
}

pub async fn room_exists(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM rooms WHERE id=?")
        .bind(room_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn is_participant(db_pool: &SqlitePool, room_id: Uuid, user_id: &str) -> ChatResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM room_participants WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// Room with its participants populated.
pub async fn find_room(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<Room> {
    let Some(mut room) = fetch_room(db_pool, room_id).await? else {
        return Err(ChatError::not_found("room"));
    };
    room.participants = participants(db_pool, room_id).await?;
    Ok(room)
}

async fn find_private(db_pool: &SqlitePool, key: &str) -> ChatResult<Option<Uuid>> {
    let id = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM rooms WHERE pair_key=? AND is_group=0")
        .bind(key)
        .fetch_optional(db_pool)
        .await?;
    Ok(id.map(|(id,)| id))
}

pub async fn get_or_create_private_room(db_pool: &SqlitePool, user_a: &str, user_b: &str) -> ChatResult<Room> {
    if user_a.trim().is_empty() || user_b.trim().is_empty() {
        return Err(ChatError::validation("both participants are required"));
    }
    if user_a == user_b {
        return Err(ChatError::validation("a private room needs two different participants"));
    }

    let key = pair_key(user_a, user_b);
    if let Some(room_id) = find_private(db_pool, &key).await? {
        return find_room(db_pool, room_id).await;
    }
    create_private(db_pool, &key, user_a, user_b).await
}

/// Inserts the pair's room, settling on the existing one if another request won.
async fn create_private(db_pool: &SqlitePool, key: &str, user_a: &str, user_b: &str) -> ChatResult<Room> {
    let new_room = NewRoom {
        name: None,
        is_group: false,
        description: None,
        pair_key: Some(key),
        participants: &[user_a, user_b],
    };
    match insert_room(db_pool, new_room).await {
        Ok(room_id) => {
            tracing::info!(%room_id, "created private room");
            find_room(db_pool, room_id).await
        }
        Err(ChatError::Conflict(reason)) => {
            // lost the create race, the winner's room is the one
            tracing::debug!(%reason, "private room already created concurrently");
            let room_id = find_private(db_pool, key)
                .await?
                .ok_or_else(|| ChatError::not_found("private room"))?;
            find_room(db_pool, room_id).await
        }
        Err(e) => Err(e),
    }
}

pub async fn create_group_room(
    db_pool: &SqlitePool,
    name: &str,
    participants: &[String],
    description: Option<&str>,
) -> ChatResult<Room> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::validation("group rooms need a name"));
    }

    let mut unique: Vec<&str> = Vec::with_capacity(participants.len());
    for user_id in participants {
        if user_id.trim().is_empty() {
            return Err(ChatError::validation("participant ids must not be empty"));
        }
        if !unique.contains(&user_id.as_str()) {
            unique.push(user_id.as_str());
        }
    }

    let room_id = insert_room(db_pool, NewRoom {
        name: Some(name),
        is_group: true,
        description: description.map(str::trim).filter(|d| !d.is_empty()),
        pair_key: None,
        participants: &unique,
    }).await?;

    tracing::info!(%room_id, name, members = unique.len(), "created group room");
    find_room(db_pool, room_id).await
}

struct NewRoom<'a> {
    name: Option<&'a str>,
    is_group: bool,
    description: Option<&'a str>,
    pair_key: Option<&'a str>,
    participants: &'a [&'a str],
}

async fn insert_room(db_pool: &SqlitePool, room: NewRoom<'_>) -> ChatResult<Uuid> {
    let id = Uuid::now_v7();
    let now = now_millis();

    let mut tx = db_pool.begin().await?;
    sqlx::query("INSERT INTO rooms (id,name,is_group,description,pair_key,created_at,updated_at) VALUES (?,?,?,?,?,?,?)")
        .bind(id)
        .bind(room.name)
        .bind(room.is_group)
        .bind(room.description)
        .bind(room.pair_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    for (position, user_id) in room.participants.iter().enumerate() {
        sqlx::query("INSERT INTO room_participants (room_id,user_id,position) VALUES (?,?,?)")
            .bind(id)
            .bind(*user_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(id)
}

/// Deletes the room together with its messages, receipts and participants.
pub async fn delete_room(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<()> {
    let mut tx = db_pool.begin().await?;

    sqlx::query("DELETE FROM message_reads WHERE message_id IN (SELECT id FROM messages WHERE room_id=?)")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    let messages = sqlx::query("DELETE FROM messages WHERE room_id=?")
        .bind(room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM room_participants WHERE room_id=?")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM rooms WHERE id=?")
        .bind(room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Err(ChatError::not_found("room"));
    }
    tx.commit().await?;

    tracing::info!(%room_id, messages, "deleted room");
    Ok(())
}

/// Removes rows left behind by rooms that no longer exist.
pub async fn sweep_orphans(db_pool: &SqlitePool) -> ChatResult<u64> {
    let mut tx = db_pool.begin().await?;
    let mut removed = 0;

    for sql in [
        "DELETE FROM messages WHERE room_id NOT IN (SELECT id FROM rooms)",
        "DELETE FROM message_reads WHERE message_id NOT IN (SELECT id FROM messages)",
        "DELETE FROM room_participants WHERE room_id NOT IN (SELECT id FROM rooms)",
    ] {
        removed += sqlx::query(sql).execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;

    Ok(removed)
}
