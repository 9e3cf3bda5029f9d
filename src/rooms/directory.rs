use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    ChatError, ChatResult,
    db::{MessageKind, Profile},
    profiles::ANONYMOUS,
};

use super::store;

pub const NO_MESSAGES: &str = "No messages yet";

#[derive(Debug, Clone, Serialize)]
pub struct PrivateRoomSummary {
    pub id: Uuid,
    pub other: Profile,
    pub last_message: String,
    pub last_message_at: i64,
    pub unread_count: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicRoomSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub participant_count: i64,
    pub is_member: bool,
    pub last_message: String,
    pub last_message_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantList {
    pub room_id: Uuid,
    pub participants: Vec<Profile>,
}

#[derive(sqlx::FromRow)]
struct PrivateRow {
    id: Uuid,
    updated_at: i64,
    other_id: String,
    other_name: String,
    other_avatar: Option<String>,
    last_kind: Option<MessageKind>,
    last_content: Option<String>,
    last_created_at: Option<i64>,
    unread_count: i64,
}

#[derive(sqlx::FromRow)]
struct PublicRow {
    id: Uuid,
    name: Option<String>,
    description: Option<String>,
    updated_at: i64,
    participant_count: i64,
    is_member: bool,
    last_kind: Option<MessageKind>,
    last_content: Option<String>,
    last_created_at: Option<i64>,
}

fn preview(kind: Option<MessageKind>, content: Option<String>) -> String {
    match (kind, content) {
        (None, _) => NO_MESSAGES.to_owned(),
        (Some(_), Some(content)) if !content.is_empty() => content,
        (Some(kind), _) => format!("[{kind}]"),
    }
}

/// Private rooms of `user_id`, most recently active first.
pub async fn list_private_rooms_for(db_pool: &SqlitePool, user_id: &str) -> ChatResult<Vec<PrivateRoomSummary>> {
    let rows = sqlx::query_as::<_, PrivateRow>(
        r#"
SELECT r.id, r.updated_at,
       o.user_id AS other_id,
       COALESCE(pr.name, ?) AS other_name,
       pr.avatar AS other_avatar,
       m.kind AS last_kind,
       m.content AS last_content,
       m.created_at AS last_created_at,
       (SELECT COUNT(*) FROM messages um
        WHERE um.room_id = r.id AND um.sender_id != ?
          AND NOT EXISTS (SELECT 1 FROM message_reads mr WHERE mr.message_id = um.id AND mr.reader_id = ?)
       ) AS unread_count
FROM rooms r
JOIN room_participants me ON me.room_id = r.id AND me.user_id = ?
JOIN room_participants o ON o.room_id = r.id AND o.user_id != ?
LEFT JOIN profiles pr ON pr.user_id = o.user_id
LEFT JOIN messages m ON m.id = r.last_message_id
WHERE r.is_group = 0
ORDER BY r.updated_at DESC, r.id DESC
        "#,
    )
        .bind(ANONYMOUS)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| PrivateRoomSummary {
            id: row.id,
            other: Profile {
                user_id: row.other_id,
                name: row.other_name,
                avatar: row.other_avatar,
            },
            last_message: preview(row.last_kind, row.last_content),
            last_message_at: row.last_created_at.unwrap_or(row.updated_at),
            unread_count: row.unread_count,
            updated_at: row.updated_at,
        })
        .collect())
}

/// Every group room, most recently active first.
pub async fn list_public_rooms(db_pool: &SqlitePool, user_id: &str) -> ChatResult<Vec<PublicRoomSummary>> {
    let rows = sqlx::query_as::<_, PublicRow>(
        r#"
SELECT r.id, r.name, r.description, r.updated_at,
       (SELECT COUNT(*) FROM room_participants p WHERE p.room_id = r.id) AS participant_count,
       EXISTS (SELECT 1 FROM room_participants p WHERE p.room_id = r.id AND p.user_id = ?) AS is_member,
       m.kind AS last_kind,
       m.content AS last_content,
       m.created_at AS last_created_at
FROM rooms r
LEFT JOIN messages m ON m.id = r.last_message_id
WHERE r.is_group = 1
ORDER BY r.updated_at DESC, r.id DESC
        "#,
    )
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| PublicRoomSummary {
            id: row.id,
            name: row.name,
            description: row.description,
            participant_count: row.participant_count,
            is_member: row.is_member,
            last_message: preview(row.last_kind, row.last_content),
            last_message_at: row.last_created_at.unwrap_or(row.updated_at),
            updated_at: row.updated_at,
        })
        .collect())
}

pub async fn list_participants(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<ParticipantList> {
    if !store::room_exists(db_pool, room_id).await? {
        return Err(ChatError::not_found("room"));
    }
    Ok(ParticipantList {
        room_id,
        participants: store::participants(db_pool, room_id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::connect_in_memory,
        rooms::{msg, store},
    };

    async fn say(db_pool: &SqlitePool, room_id: Uuid, sender: &str, content: &str) {
        msg::post_message(db_pool, room_id, sender, MessageKind::Text, Some(content.into()))
            .await
            .unwrap();
    }

    #[test]
    fn preview_falls_back_per_kind() {
        assert_eq!(preview(None, None), NO_MESSAGES);
        assert_eq!(preview(Some(MessageKind::Text), Some("hi".into())), "hi");
        assert_eq!(preview(Some(MessageKind::Image), None), "[image]");
        assert_eq!(preview(Some(MessageKind::File), Some(String::new())), "[file]");
    }

    #[tokio::test]
    async fn private_listing_is_enriched() {
        let db_pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO profiles (user_id,name,avatar) VALUES ('u2','Bea','bea.png')")
            .execute(&db_pool)
            .await
            .unwrap();
        let quiet = store::get_or_create_private_room(&db_pool, "u1", "u3").await.unwrap();
        let chatty = store::get_or_create_private_room(&db_pool, "u2", "u1").await.unwrap();
        say(&db_pool, chatty.id, "u2", "first").await;
        say(&db_pool, chatty.id, "u2", "second").await;
        say(&db_pool, chatty.id, "u1", "mine").await;
        store::create_group_room(&db_pool, "Book club", &["u1".into()], None).await.unwrap();

        let rooms = list_private_rooms_for(&db_pool, "u1").await.unwrap();
        assert_eq!(rooms.len(), 2);

        let top = &rooms[0];
        assert_eq!(top.id, chatty.id);
        assert_eq!(top.other.name, "Bea");
        assert_eq!(top.other.avatar.as_deref(), Some("bea.png"));
        assert_eq!(top.last_message, "mine");
        assert_eq!(top.unread_count, 2);

        let bottom = &rooms[1];
        assert_eq!(bottom.id, quiet.id);
        assert_eq!(bottom.other.user_id, "u3");
        assert_eq!(bottom.other.name, ANONYMOUS);
        assert_eq!(bottom.last_message, NO_MESSAGES);
        assert_eq!(bottom.last_message_at, bottom.updated_at);
        assert_eq!(bottom.unread_count, 0);
    }

    #[tokio::test]
    async fn private_listing_excludes_strangers() {
        let db_pool = connect_in_memory().await.unwrap();
        store::get_or_create_private_room(&db_pool, "u2", "u3").await.unwrap();
        assert!(list_private_rooms_for(&db_pool, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn public_listing_reports_membership() {
        let db_pool = connect_in_memory().await.unwrap();
        let football = store::create_group_room(&db_pool, "Football", &["u1".into(), "u2".into()], None)
            .await
            .unwrap();
        let chess = store::create_group_room(&db_pool, "Chess", &["u2".into()], Some("blitz"))
            .await
            .unwrap();
        say(&db_pool, football.id, "u1", "kickoff at 6").await;
        store::get_or_create_private_room(&db_pool, "u1", "u2").await.unwrap();

        let rooms = list_public_rooms(&db_pool, "u1").await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms[0].updated_at >= rooms[1].updated_at);

        let find = |id| rooms.iter().find(|r| r.id == id).unwrap();
        let football = find(football.id);
        assert!(football.is_member);
        assert_eq!(football.participant_count, 2);
        assert_eq!(football.last_message, "kickoff at 6");

        let chess = find(chess.id);
        assert!(!chess.is_member);
        assert_eq!(chess.description.as_deref(), Some("blitz"));
        assert_eq!(chess.last_message, NO_MESSAGES);
    }

    #[tokio::test]
    async fn participants_of_missing_room_is_not_found() {
        let db_pool = connect_in_memory().await.unwrap();
        assert!(matches!(
            list_participants(&db_pool, Uuid::now_v7()).await,
            Err(ChatError::NotFound(_))
        ));
    }
}
