// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PowerMan.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod api;

pub use api::{ApiError, UpdateOptionsRequest};

use axum::{
    Router,
    routing::{get, post},
};
use powerman_core::SubscriptionManager;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Application state for web handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub manager: Arc<SubscriptionManager>,
}

/// All HTTP routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(api::health_handler))
        .route("/api/entries", get(api::list_entries_handler))
        .route("/api/entries/{id}/advice", get(api::advice_handler))
        .route("/api/entries/{id}/actions/{action}", post(api::action_handler))
        .route(
            "/api/entries/{id}/options",
            get(api::get_options_handler).put(api::update_options_handler),
        )
        .layer(CorsLayer::permissive()) // Allow HA Ingress
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
///
/// # Errors
/// Returns error if the server fails to bind or serve
pub async fn start_web_server(
    manager: Arc<SubscriptionManager>,
    bind_address: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(AppState { manager });

    let addr = format!("{bind_address}:{port}");
    info!("🌐 Starting web server on {addr}");
    info!("📱 API: http://localhost:{}/api/health", port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
