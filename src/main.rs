use anyhow::Result;
use mercat_backend::{create_app_router, db, services::IngestionWorker, state::AppState};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let app_state = AppState::new().await?;
    info!("🚀 Application state initialized");

    db::ensure_schema(&app_state.db_pool).await?;

    // Background ticket ingestion worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = IngestionWorker::new(&app_state, shutdown_rx.clone());
    let worker_handle = tokio::spawn(worker.run());
    info!(
        "🎫 Ingestion worker started (polling every {}s)",
        app_state.config.worker.poll_interval_seconds
    );

    let bind_addr = app_state.config.app.bind_addr.clone();
    let app = create_app_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("🌐 Backend listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Let the worker finish its in-flight ticket before exiting.
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Ingestion worker task panicked");
    }

    info!("Backend stopped");
    Ok(())
}
