use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use crate::{ChatError, config::Config};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&db_pool).await?;
    Ok(db_pool)
}

/// Single-connection pool over a private in-memory database, migrated.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    // every sqlite :memory: connection is its own database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    MIGRATOR.run(&db_pool).await?;
    Ok(db_pool)
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Display projection of a user, read from the profiles table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Room {
    pub id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub description: Option<String>,
    #[sqlx(skip)]
    pub participants: Vec<Profile>,
    pub last_message_id: Option<Uuid>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Room {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        use MessageKind::*;
        match self {
            Text => "text",
            Image => "image",
            File => "file",
        }
    }

    /// Parses an optional wire tag, defaulting to `Text`.
    pub fn from_tag(tag: Option<&str>) -> Result<Self, ChatError> {
        tag.map_or(Ok(MessageKind::Text), |t| t.parse())
    }
}

impl FromStr for MessageKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            other => Err(ChatError::validation(format!("unknown message kind {other:?}"))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: String,
    #[sqlx(skip)]
    pub sender: Option<Profile>,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub edited: bool,
    #[sqlx(skip)]
    pub read_by: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults_to_text() {
        assert_eq!(MessageKind::from_tag(None).unwrap(), MessageKind::Text);
        assert_eq!(MessageKind::default(), MessageKind::Text);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(MessageKind::from_tag(Some("video")), Err(ChatError::Validation(_))));
        assert!(matches!(MessageKind::from_tag(Some("Text")), Err(ChatError::Validation(_))));
        assert_eq!(MessageKind::from_tag(Some("file")).unwrap(), MessageKind::File);
    }

    #[tokio::test]
    async fn in_memory_pool_is_migrated() {
        let db_pool = connect_in_memory().await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
