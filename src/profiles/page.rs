use axum::{debug_handler, extract::{Path, State}, Json};
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, db::Profile, AppResult};

use super::lookup;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(
    Path(user_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    _user: CurrentUser,
) -> AppResult<Json<Profile>> {
    Ok(Json(lookup::lookup(&db_pool, &user_id).await?))
}
