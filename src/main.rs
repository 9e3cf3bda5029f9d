use axum::http::HeaderValue;
use kisschat::{app, auth::TokenVerifier, config::Config, db, rooms::store, AppState};
use tower_http::cors::{Any, CorsLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kisschat=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session_inactivity));

    let db_pool = db::connect(&config).await?;
    tracing::info!(url = %config.database_url, "database ready");

    let sweep_pool = db_pool.clone();
    let sweep_every = config.orphan_sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            match store::sweep_orphans(&sweep_pool).await {
                Ok(0) => {}
                Ok(swept) => tracing::info!(swept, "swept orphaned rows"),
                Err(e) => tracing::warn!("orphan sweep failed: {e}"),
            }
        }
    });

    let verifier = TokenVerifier::new(&config.auth_secret, config.auth_issuer.clone());
    let mut app = app(AppState::new(db_pool, config.empty_room_policy, verifier)).layer(session_layer);
    if let Some(origin) = &config.cors_origin {
        let cors = CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
