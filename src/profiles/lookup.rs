use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{ChatResult, db::Profile};

/// Display name of users without a profile row.
pub const ANONYMOUS: &str = "Anonymous";

pub fn anonymous(user_id: &str) -> Profile {
    Profile {
        user_id: user_id.to_owned(),
        name: ANONYMOUS.to_owned(),
        avatar: None,
    }
}

pub async fn lookup(db_pool: &SqlitePool, user_id: &str) -> ChatResult<Profile> {
    let profile = sqlx::query_as::<_, Profile>("SELECT user_id,name,avatar FROM profiles WHERE user_id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(profile.unwrap_or_else(|| anonymous(user_id)))
}

/// Profiles for every id in `user_ids`, anonymous where missing.
pub async fn lookup_many(db_pool: &SqlitePool, user_ids: &[&str]) -> ChatResult<HashMap<String, Profile>> {
    let mut profiles: HashMap<String, Profile> = user_ids
        .iter()
        .map(|id| (id.to_string(), anonymous(id)))
        .collect();
    if profiles.is_empty() {
        return Ok(profiles);
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT user_id,name,avatar FROM profiles WHERE user_id IN (");
    let mut ids = query.separated(",");
    for id in profiles.keys() {
        ids.push_bind(id.clone());
    }
    ids.push_unseparated(")");

    for profile in query.build_query_as::<Profile>().fetch_all(db_pool).await? {
        profiles.insert(profile.user_id.clone(), profile);
    }
    Ok(profiles)
}
