use std::collections::HashMap;

use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    ChatError, ChatResult,
    db::{Message, MessageKind, now_millis},
    live::{Broadcaster, LiveEvent},
    profiles,
};

use super::store;

const MESSAGE_COLUMNS: &str = "id,room_id,sender_id,kind,content,edited,created_at,updated_at";

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageQuery {
    pub kind: Option<String>,
    pub content: Option<String>,
}

fn is_blank(content: Option<&str>) -> bool {
    content.is_none_or(|c| c.trim().is_empty())
}

/// Persists a message and points the room's last message at it, atomically.
pub async fn post_message(
    db_pool: &SqlitePool,
    room_id: Uuid,
    sender_id: &str,
    kind: MessageKind,
    content: Option<String>,
) -> ChatResult<Message> {
    if kind == MessageKind::Text && is_blank(content.as_deref()) {
        return Err(ChatError::validation("text messages need content"));
    }
    let content = content.filter(|c| !c.is_empty());
    // resolved up front so a committed message is never reported as failed
    let sender = profiles::lookup(db_pool, sender_id).await?;

    let id = Uuid::now_v7();
    let now = now_millis();

    let mut tx = db_pool.begin().await?;
    // clamp so creation time never goes backwards against commit order
    let (created_at,): (i64,) = sqlx::query_as(
        r#"
INSERT INTO messages (id,room_id,sender_id,kind,content,created_at,updated_at)
SELECT ?, ?, ?, ?, ?, MAX(?, COALESCE(MAX(created_at), 0)), MAX(?, COALESCE(MAX(created_at), 0))
FROM messages WHERE room_id = ?
RETURNING created_at
        "#,
    )
        .bind(id)
        .bind(room_id)
        .bind(sender_id)
        .bind(kind)
        .bind(&content)
        .bind(now)
        .bind(now)
        .bind(room_id)
        .fetch_one(&mut *tx)
        .await?;
    let touched = sqlx::query("UPDATE rooms SET last_message_id=?, updated_at=? WHERE id=?")
        .bind(id)
        .bind(created_at)
        .bind(room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if touched == 0 {
        tx.rollback().await?;
        return Err(ChatError::not_found("room"));
    }
    tx.commit().await?;

    Ok(Message {
        id,
        room_id,
        sender_id: sender_id.to_owned(),
        sender: Some(sender),
        kind,
        content,
        edited: false,
        read_by: vec![],
        created_at,
        updated_at: created_at,
    })
}

pub async fn find_message(db_pool: &SqlitePool, message_id: Uuid) -> ChatResult<Message> {
    let Some(mut message) = sqlx::query_as::<_, Message>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?"))
        .bind(message_id)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(ChatError::not_found("message"));
    };

    let readers = sqlx::query_as::<_, (String,)>("SELECT reader_id FROM message_reads WHERE message_id=? ORDER BY read_at, reader_id")
        .bind(message_id)
        .fetch_all(db_pool)
        .await?;
    message.read_by = readers.into_iter().map(|(reader,)| reader).collect();
    message.sender = Some(profiles::lookup(db_pool, &message.sender_id).await?);
    Ok(message)
}

pub async fn edit_message(
    db_pool: &SqlitePool,
    message_id: Uuid,
    requester: &str,
    content: &str,
) -> ChatResult<Message> {
    let message = find_message(db_pool, message_id).await?;
    if message.sender_id != requester {
        return Err(ChatError::Forbidden("only the sender can edit a message".into()));
    }
    if message.kind != MessageKind::Text {
        return Err(ChatError::validation(format!("{} messages cannot be edited", message.kind)));
    }
    if content.trim().is_empty() {
        return Err(ChatError::validation("text messages need content"));
    }

    let now = now_millis();
    sqlx::query("UPDATE messages SET content=?, edited=1, updated_at=? WHERE id=?")
        .bind(content)
        .bind(now)
        .bind(message_id)
        .execute(db_pool)
        .await?;

    Ok(Message {
        content: Some(content.to_owned()),
        edited: true,
        updated_at: now,
        ..message
    })
}

/// Acknowledges every message of the room for `reader_id`. Returns how many
/// receipts were new.
pub async fn mark_read(db_pool: &SqlitePool, room_id: Uuid, reader_id: &str) -> ChatResult<u64> {
    let marked = sqlx::query(
        "INSERT OR IGNORE INTO message_reads (message_id,reader_id,read_at) SELECT id, ?, ? FROM messages WHERE room_id=?",
    )
        .bind(reader_id)
        .bind(now_millis())
        .bind(room_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(marked)
}

/// All messages of a room in commit order.
pub async fn list_history(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<Vec<Message>> {
    if !store::room_exists(db_pool, room_id).await? {
        return Err(ChatError::not_found("room"));
    }

    let mut messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id=? ORDER BY seq",
    ))
        .bind(room_id)
        .fetch_all(db_pool)
        .await?;

    let receipts = sqlx::query_as::<_, (Uuid, String)>(
        r#"
SELECT r.message_id, r.reader_id
FROM message_reads r
JOIN messages m ON m.id = r.message_id
WHERE m.room_id = ?
ORDER BY r.read_at, r.reader_id
        "#,
    )
        .bind(room_id)
        .fetch_all(db_pool)
        .await?;
    let mut read_by: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (message_id, reader_id) in receipts {
        read_by.entry(message_id).or_default().push(reader_id);
    }

    let senders: Vec<&str> = messages.iter().map(|m| m.sender_id.as_str()).collect();
    let senders = profiles::lookup_many(db_pool, &senders).await?;

    for message in &mut messages {
        message.read_by = read_by.remove(&message.id).unwrap_or_default();
        message.sender = senders.get(&message.sender_id).cloned();
    }
    Ok(messages)
}

/// Messages in the room neither sent nor acknowledged by `user_id`.
pub async fn unread_count(db_pool: &SqlitePool, room_id: Uuid, user_id: &str) -> ChatResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
SELECT COUNT(*) FROM messages m
WHERE m.room_id = ? AND m.sender_id != ?
  AND NOT EXISTS (SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.reader_id = ?)
        "#,
    )
        .bind(room_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

/// Rejects senders who are not in the room, telling a missing room apart.
async fn ensure_participant(db_pool: &SqlitePool, room_id: Uuid, user_id: &str) -> ChatResult<()> {
    if store::is_participant(db_pool, room_id, user_id).await? {
        return Ok(());
    }
    if store::room_exists(db_pool, room_id).await? {
        Err(ChatError::Forbidden("only participants can post in this room".into()))
    } else {
        Err(ChatError::not_found("room"))
    }
}

/// Posts as `sender_id` and fans the committed message out to the room.
pub async fn send_msg(
    db_pool: &SqlitePool,
    live: &Broadcaster,
    sender_id: &str,
    room_id: Uuid,
    SendMessageQuery { kind, content }: SendMessageQuery,
) -> ChatResult<Message> {
    let kind = MessageKind::from_tag(kind.as_deref())?;
    ensure_participant(db_pool, room_id, sender_id).await?;

    let _order = live.sequence(room_id).await;
    let message = post_message(db_pool, room_id, sender_id, kind, content).await?;
    let delivered = live.broadcast(room_id, &LiveEvent::ReceiveMessage { message: message.clone() });
    tracing::debug!(%room_id, message_id = %message.id, delivered, "message sent");

    Ok(message)
}

pub async fn edit_msg(
    db_pool: &SqlitePool,
    live: &Broadcaster,
    requester: &str,
    message_id: Uuid,
    content: &str,
) -> ChatResult<Message> {
    let message = edit_message(db_pool, message_id, requester, content).await?;
    live.broadcast(message.room_id, &LiveEvent::MessageEdited { message: message.clone() });
    Ok(message)
}
