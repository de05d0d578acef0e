//! HTTP/WebSocket surface
//!
//! Routing only: the handlers validate shape and delegate to the scheduler,
//! coordinator, catalog, and history modules.

pub mod models;
pub mod rest;
pub mod ws;

use crate::bus::ProgressBus;
use crate::catalog::CatalogReader;
use crate::config::ServerConfig;
use crate::coordinator::TaskCoordinator;
use crate::history::HistoryReader;
use crate::scheduler::Scheduler;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared state behind every handler
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub scheduler: Arc<Scheduler>,
    pub coordinator: Arc<TaskCoordinator>,
    pub bus: Arc<ProgressBus>,
    pub catalog: CatalogReader,
    pub history: HistoryReader,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        scheduler: Arc<Scheduler>,
        coordinator: Arc<TaskCoordinator>,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            catalog: CatalogReader::new(Arc::clone(&config)),
            history: HistoryReader::new(config.outputs_dir.clone()),
            config,
            scheduler,
            coordinator,
            bus,
            started_at: Instant::now(),
        }
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let images = ServeDir::new(&state.config.outputs_dir);
    Router::new()
        .route("/settings", get(rest::get_settings))
        .route("/gpus", get(rest::get_gpus))
        .route("/generate", post(rest::post_generate))
        .route("/status/:task_id", get(rest::get_status))
        .route("/stop", post(rest::post_stop))
        .route("/history", get(rest::get_history))
        .route(
            "/config/editor",
            get(rest::get_config_editor).post(rest::post_config_editor),
        )
        .route("/health", get(rest::get_health))
        .route("/ws", get(ws::ws_handler))
        .nest_service("/images", images)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
