//! Read-only view of the user service's profiles, used for display fields.

mod lookup;
mod page;

use axum::{routing::get, Router};

use crate::AppState;

pub use lookup::{anonymous, lookup, lookup_many, ANONYMOUS};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}", get(page::profile))
}
