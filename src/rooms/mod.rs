mod new;
mod room;
mod ws;

pub mod directory;
pub mod membership;
pub mod msg;
pub mod store;

use axum::{routing::{get, patch, post}, Router};

use crate::AppState;

pub use ws::live_ws;

/// What happens to a group room once its last participant leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyRoomPolicy {
    #[default]
    Keep,
    Delete,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new::new_room))
        .route("/private", get(room::private_rooms).post(new::new_private_room))
        .route("/public", get(room::public_rooms))
        .route("/{uuid}", get(room::room).delete(room::delete_room))
        .route("/{uuid}/participants", get(room::participants))
        .route("/{uuid}/messages", get(room::history).post(room::post_message))
        .route("/{uuid}/join", post(room::join_room))
        .route("/{uuid}/leave", post(room::leave_room))
        .route("/{uuid}/read", post(room::mark_read))
        .route("/{uuid}/unread", get(room::unread))
}

pub fn message_router() -> Router<AppState> {
    Router::new()
        .route("/{uuid}", patch(room::edit_message))
}
