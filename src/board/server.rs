use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::{Notify, broadcast, watch};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::auth::hash_password;
use super::db::{BoardDb, DbHandle};
use super::notify::{Mailer, mailer_from_config, run_overdue_scheduler};
use super::store::{
    MIRROR_DEBOUNCE, load_initial, mirror_stores_from_config, run_mirror, stores_from_config,
};
use super::ws;
use crate::config::BoardConfig;

/// Everything `start_server` needs: the resolved configuration and the
/// directory its relative paths are anchored to.
pub struct ServerConfig {
    pub project_dir: PathBuf,
    pub board: BoardConfig,
}

impl ServerConfig {
    pub fn db_path(&self) -> PathBuf {
        self.project_dir.join(&self.board.storage.db_path)
    }
}

/// Build the full application router with the API and the WebSocket feed.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_tx = state.ws_tx.clone();
    let dev = state.config.server.dev;

    let mut app = api::api_router()
        .route(
            "/ws",
            get(move |ws_upgrade| ws::ws_handler_with_sender(ws_upgrade, ws_tx)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if dev {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open the database, seeding it from a snapshot store or with defaults
/// when it is empty.
pub async fn prepare_database(config: &ServerConfig) -> Result<DbHandle> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = BoardDb::new(&db_path).context("Failed to initialize board database")?;
    let db = DbHandle::new(db);

    let stores = stores_from_config(&config.board.storage, &config.project_dir);
    load_initial(&db, &stores).await?;

    let auth = &config.board.auth;
    if auth.seed_admin {
        let (password, cost) = (auth.admin_password.clone(), auth.bcrypt_cost);
        let hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .context("Password hashing task failed")??;
        if db.call(move |db| db.seed_defaults(&hash)).await? {
            tracing::warn!("Seeded default admin account; change its password");
        }
    }
    Ok(db)
}

/// Start the board server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = prepare_database(&config).await?;
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let mailer: Arc<dyn Mailer> = mailer_from_config(&config.board.notifications);
    let dirty = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut background = Vec::new();
    let mirrors = mirror_stores_from_config(&config.board.storage, &config.project_dir);
    if !mirrors.is_empty() {
        background.push(tokio::spawn(run_mirror(
            db.clone(),
            mirrors,
            dirty.clone(),
            MIRROR_DEBOUNCE,
            shutdown_rx.clone(),
        )));
    }
    if config.board.notifications.enabled {
        background.push(tokio::spawn(run_overdue_scheduler(
            db.clone(),
            mailer.clone(),
            config.board.notifications.clone(),
            shutdown_rx.clone(),
        )));
    }

    let addr = format!("{}:{}", config.board.server.host, config.board.server.port);
    let state = Arc::new(AppState {
        db,
        ws_tx,
        config: config.board,
        mailer,
        dirty,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "pmboard listening");
    println!("pmboard running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let the mirror write its final export before exiting.
    let _ = shutdown_tx.send(true);
    for task in background {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
