pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod live;
pub mod profiles;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};
pub use error::{ChatError, ChatResult};

use crate::{auth::TokenVerifier, live::Broadcaster, rooms::EmptyRoomPolicy};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub live: Arc<Broadcaster>,
    pub policy: EmptyRoomPolicy,
    pub verifier: TokenVerifier,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, policy: EmptyRoomPolicy, verifier: TokenVerifier) -> Self {
        Self {
            db_pool,
            live: Arc::new(Broadcaster::new()),
            policy,
            verifier,
        }
    }
}

/// Every route of the service; the session layer is added by the caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/live", get(rooms::live_ws))

        .merge(auth::router())
        .nest("/r", rooms::router())
        .nest("/m", rooms::message_router())
        .nest("/p", profiles::router())

        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
