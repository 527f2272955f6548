use axum::{
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api::{self, AppState};
use crate::error::AlertError;
use crate::lifecycle::AlertManager;

pub struct WebServer {
    host: String,
    port: u16,
    manager: Arc<AlertManager>,
}

impl WebServer {
    pub fn new(host: String, port: u16, manager: Arc<AlertManager>) -> Self {
        Self {
            host,
            port,
            manager,
        }
    }

    pub async fn start(&self) -> Result<(), AlertError> {
        let app = self.create_router();

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AlertError::Error(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AlertError::Error(format!("Failed to bind to {}: {}", addr, e)))?;

        log::info!("Server ready to handle requests on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                log::info!("Shutdown signal received, stopping server");
            })
            .await
            .map_err(|e| AlertError::Error(format!("Server error: {}", e)))?;

        // Let queued notifications reach the sink before exiting
        self.manager.notifier().join();
        log::info!("Server shutdown complete");

        Ok(())
    }

    fn create_router(&self) -> Router {
        let app_state = AppState::new(Arc::clone(&self.manager));

        Router::new()
            // Health check
            .route("/health", get(health_check))

            // Alert endpoints
            .route("/api/alerts", get(api::alerts::list_alerts).post(api::alerts::create_alert))
            .route("/api/alerts/count", get(api::alerts::count_alerts))
            .route("/api/alerts/{alert_id}", get(api::alerts::get_alert).patch(api::alerts::update_alert))

            // Trigger endpoints
            .route("/api/triggers/template-version", post(api::triggers::template_version))
            .route("/api/triggers/plugin-version", post(api::triggers::plugin_version))

            // Resource endpoints
            .route("/api/resources/{resource_id}/template-version", post(api::triggers::upgrade_template))
            .route(
                "/api/resources/{resource_id}/resolve-template-alerts",
                post(api::triggers::resolve_template_alerts),
            )

            // Add state for handlers
            .with_state(app_state)
    }
}

async fn health_check() -> Result<(StatusCode, Html<String>), StatusCode> {
    Ok((
        StatusCode::OK,
        Html("<h1>versionalert</h1><p>Server is running</p>".to_string()),
    ))
}

/// Waits for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            log::info!("Received SIGTERM");
        },
    }
}
