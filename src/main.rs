use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vidstream::app;
use vidstream::config::settings::AppConfig;
use vidstream::infrastructure::db::pool::{connect_to_db, run_migrations};
use vidstream::modules::video::memory::InMemoryVideoRepository;
use vidstream::modules::video::repository::{PgVideoRepository, VideoRepository};
use vidstream::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");
    let config = AppConfig::new();

    let videos: Arc<dyn VideoRepository> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_to_db(url).await.context("connecting to PostgreSQL")?;
            run_migrations(&pool).await.context("applying migrations")?;
            Arc::new(PgVideoRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, video records are kept in memory and lost on restart");
            Arc::new(InMemoryVideoRepository::new())
        }
    };

    let state = AppState::new(config.clone(), videos);
    state
        .layout
        .ensure_dirs()
        .await
        .context("preparing storage directories")?;
    state
        .orchestrator
        .recover()
        .await
        .context("recovering interrupted transcodes")?;

    let app = app::create_app(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server stopped, stopping transcoder");
    state.orchestrator.shutdown(config.shutdown_grace()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
