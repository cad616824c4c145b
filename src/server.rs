//! HTTP server startup.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::db::Database;
use crate::media::MediaStore;

/// Open storage and build the application router for `config`.
pub fn build_app(config: &Config) -> Result<Router> {
    let db = Database::open(&config.paths.db_path).with_context(|| {
        format!(
            "Failed to open database {}",
            config.paths.db_path.display()
        )
    })?;
    std::fs::create_dir_all(&config.paths.media_dir).with_context(|| {
        format!(
            "Failed to create media directory {}",
            config.paths.media_dir.display()
        )
    })?;
    let media = MediaStore::new(&config.paths.media_dir);

    let state = AppState::new(Arc::new(db), Arc::new(media))
        .with_page_size(config.pagination.page_size);
    Ok(api::router(state, &config.server))
}

/// Serve the API until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let app = build_app(config)?;

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let bound_addr = listener.local_addr()?;

    info!(
        db = %config.paths.db_path.display(),
        media = %config.paths.media_dir.display(),
        "Task tracker listening on http://{}",
        bound_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Task tracker shutting down");
        })
        .await?;

    Ok(())
}
