//! REST handlers
//!
//! Thin routing layer: shape validation and delegation only; every decision
//! lives in the scheduler, coordinator, catalog, and history modules.

use crate::api::models::*;
use crate::api::AppState;
use crate::args::GenerationRequest;
use crate::config::EditorConfig;
use crate::error::OrchestratorError;
use crate::task::TaskSnapshot;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::Value;
use std::sync::Arc;

/// `GET /settings`
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<crate::catalog::CatalogSnapshot> {
    Json(state.catalog.snapshot())
}

/// `GET /gpus`
pub async fn get_gpus(State(state): State<Arc<AppState>>) -> Json<GpusResponse> {
    let slots = state.scheduler.slots();
    Json(GpusResponse {
        multi_gpu_enabled: state.scheduler.multi_enabled(),
        gpu_count: slots.len(),
        gpus: slots
            .into_iter()
            .map(|slot| GpuInfo {
                device: slot.device,
                name: slot.display_name,
                weight: slot.weight,
                busy: slot.busy,
                port: slot.port,
            })
            .collect(),
    })
}

/// `POST /generate`
pub async fn post_generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<GenerateResponse>) {
    let request = match GenerationRequest::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(GenerateResponse::error(e.to_string())),
            )
        }
    };

    match state.coordinator.submit(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(GenerateResponse::started(
                outcome.task_id,
                outcome.gpus,
                outcome.total_images,
            )),
        ),
        Err(e) => {
            let status = match &e {
                OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
                OrchestratorError::NoResource(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(GenerateResponse::error(e.to_string())))
        }
    }
}

/// `GET /status/{task_id}`
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state
        .coordinator
        .store()
        .snapshot(&task_id)
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("task {} not found", task_id),
                }),
            )
        })
}

/// `POST /stop` — global best-effort cancel of everything in flight
pub async fn post_stop(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let requested = state.coordinator.stop_all().await;
    Json(StopResponse {
        requested,
        success: true,
    })
}

/// `GET /history?limit=N&offset=M`
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Json<crate::history::HistoryPage> {
    Json(state.history.load(params.limit, params.offset))
}

/// `GET /config/editor`
pub async fn get_config_editor(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EditorConfigResponse>, (StatusCode, Json<ErrorResponse>)> {
    let editor = discover_editor(&state)?;
    let config = editor.read().map_err(internal)?;
    Ok(Json(EditorConfigResponse {
        config,
        keys: editor.keys(),
    }))
}

/// `POST /config/editor` — strict schema check, persisted for next restart
pub async fn post_config_editor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<EditorWriteResponse>, (StatusCode, Json<ErrorResponse>)> {
    let update = match body {
        Value::Object(map) => map,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "config update must be a JSON object".to_string(),
                }),
            ))
        }
    };

    let editor = discover_editor(&state)?;
    editor.write(update).map_err(|e| match e {
        OrchestratorError::Validation(reason) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: reason }),
        ),
        other => internal(other),
    })?;

    Ok(Json(EditorWriteResponse {
        status: "ok",
        restart_required: true,
    }))
}

/// `GET /health`
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

fn discover_editor(
    state: &AppState,
) -> Result<EditorConfig, (StatusCode, Json<ErrorResponse>)> {
    EditorConfig::discover(
        &state.config.editor_config_path,
        &state.config.editor_tutorial_path,
    )
    .map_err(internal)
}

fn internal(e: OrchestratorError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
