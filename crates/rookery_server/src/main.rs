//! Rookery server binary.

use anyhow::{Context, Result};
use clap::Parser;
use rookery_core::StandardChess;
use rookery_server::cli::{Cli, Command};
use rookery_server::{
    AppState, ArchiveStore, GameService, InMemoryActiveStore, InMemoryArchiveStore,
    ServerConfig, SqliteArchiveStore, router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

/// How often expired sessions are swept from the active store.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rookery_server=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    match cli.command {
        Command::Serve {
            host,
            port,
            archive,
        } => {
            config.set_bind(host, port);
            config.set_archive_path(archive);
            config.validate()?;
            serve(config).await
        }
        Command::CheckConfig => {
            config.validate()?;
            println!("{}", toml::to_string(&config)?);
            Ok(())
        }
    }
}

/// Runs the HTTP and WebSocket server until interrupted.
#[instrument(skip(config), fields(host = %config.host(), port = config.port()))]
async fn serve(config: ServerConfig) -> Result<()> {
    let active = Arc::new(InMemoryActiveStore::new(config.session_ttl()));
    let archive: Arc<dyn ArchiveStore> = match config.archive_path() {
        Some(path) => Arc::new(
            SqliteArchiveStore::open(path.clone())
                .with_context(|| format!("Opening archive at {}", path))?,
        ),
        None => {
            info!("No archive path configured, finished games are kept in memory");
            Arc::new(InMemoryArchiveStore::new())
        }
    };

    let service = GameService::builder(active.clone(), archive, Arc::new(StandardChess))
        .store_timeout(config.store_timeout())
        .build();
    let state = AppState::new(
        service,
        config.connection(),
        *config.default_time_control(),
    );

    let purge = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            active.purge_expired().await;
        }
    });

    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port()))
        .await
        .with_context(|| format!("Binding {}:{}", config.host(), config.port()))?;
    info!(addr = %listener.local_addr()?, "Server ready");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await?;

    purge.abort();
    info!("Server stopped");
    Ok(())
}
