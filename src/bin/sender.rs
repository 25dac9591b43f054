use anyhow::Result;
use mercat_backend::db;
use mercat_backend::sender::{create_sender_router, routes::SenderState, NotificationManager};
use shared::{Config, Database};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let database = Database::connect(&config.database).await?;
    let db = database.pool().clone();

    db::ensure_schema(&db).await?;

    let manager = Arc::new(NotificationManager::new(db.clone(), &config.vapid));
    let state = SenderState { db, manager };

    let app = create_sender_router(state);

    let listener = tokio::net::TcpListener::bind(&config.app.sender_bind_addr).await?;
    info!("📣 Notification sender listening on {}", config.app.sender_bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
