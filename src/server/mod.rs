//! Local HTTP front end for the cover gallery
//!
//! Serves the single page UI, the JSON API and the raw image bytes of the
//! managed folder. Intended for localhost use by a single person, there is
//! no authentication.

mod handlers;
mod routes;

pub use handlers::{ApiError, SharedGallery};
pub use routes::create_router;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::gallery::Gallery;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or address to bind to
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

impl ServerConfig {
    /// Address shown to the user
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Run the gallery server until Ctrl-C
pub async fn run_server(config: ServerConfig, gallery: Arc<Gallery>) -> Result<()> {
    tracing::info!("Starting cover gallery server on {}:{}", config.host, config.port);
    tracing::info!("Folder: {}", gallery.folder().display());

    let app = create_router(gallery);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!("Gallery is ready at {}", config.url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
