//! Request and response shapes for the HTTP surface

use crate::task::GpuShare;
use serde::{Deserialize, Serialize};

/// `GET /gpus` response
#[derive(Debug, Serialize)]
pub struct GpusResponse {
    pub multi_gpu_enabled: bool,
    pub gpu_count: usize,
    pub gpus: Vec<GpuInfo>,
}

/// One GPU slot as exposed to the UI
#[derive(Debug, Serialize)]
pub struct GpuInfo {
    pub device: u32,
    pub name: String,
    pub weight: u32,
    pub busy: bool,
    pub port: u16,
}

/// `POST /generate` response
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpus: Option<Vec<GpuShare>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_images: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    pub fn started(task_id: String, gpus: Vec<GpuShare>, total_images: u32) -> Self {
        Self {
            task_id: Some(task_id),
            status: "Started",
            gpus: Some(gpus),
            total_images: Some(total_images),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            task_id: None,
            status: "Error",
            gpus: None,
            total_images: None,
            error: Some(message),
        }
    }
}

/// `POST /stop` response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Tasks a cancel was requested for
    pub requested: usize,
    pub success: bool,
}

/// `GET /health` response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
}

/// `GET /history` query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_history_limit() -> usize {
    100
}

/// `GET /config/editor` response
#[derive(Debug, Serialize)]
pub struct EditorConfigResponse {
    pub config: serde_json::Map<String, serde_json::Value>,
    pub keys: Vec<String>,
}

/// `POST /config/editor` response
#[derive(Debug, Serialize)]
pub struct EditorWriteResponse {
    pub status: &'static str,
    pub restart_required: bool,
}

/// Generic error body for non-generate endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
