//! Configuration management
//!
//! Three configuration surfaces: the server settings (listen address, content
//! paths, worker launch command, timing knobs), the GPU table document, and
//! the user-editable flat config whose schema is discovered from a companion
//! tutorial file.

use crate::error::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP/WebSocket bind address
    pub listen_addr: String,
    /// Generated image output root (served under /images, scanned by history)
    pub outputs_dir: PathBuf,
    /// Checkpoint model directory
    pub models_dir: PathBuf,
    /// LoRA directory
    pub loras_dir: PathBuf,
    /// VAE directory
    pub vaes_dir: PathBuf,
    /// Style definition directory (*.json)
    pub styles_dir: PathBuf,
    /// Preset directory (*.json)
    pub presets_dir: PathBuf,
    /// GPU table document path
    pub gpu_config_path: PathBuf,
    /// User-editable flat config document
    pub editor_config_path: PathBuf,
    /// Companion tutorial file the editor schema is discovered from
    pub editor_tutorial_path: PathBuf,
    /// Worker launch command: program followed by arguments
    pub worker_command: Vec<String>,
    /// First worker port; slot i is assigned base + i (advisory)
    pub worker_base_port: u16,
    /// Readiness probe attempts after spawn
    pub startup_probe_attempts: u32,
    /// Cooldown between readiness probes
    pub startup_probe_cooldown: Duration,
    /// Task coordinator polling tick
    pub poll_interval: Duration,
    /// Wall-clock cap per sub-task, measured from generate acceptance
    pub sub_task_timeout: Duration,
    /// Per-call RPC timeout for progress/health/stop
    pub rpc_timeout: Duration,
    /// Per-call RPC timeout for generate acceptance
    pub generate_timeout: Duration,
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.worker_command.is_empty() {
            return Err(OrchestratorError::Config(
                "worker command cannot be empty".to_string(),
            ));
        }
        if self.startup_probe_attempts == 0 {
            return Err(OrchestratorError::Config(
                "startup probe attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8188".to_string(),
            outputs_dir: PathBuf::from("outputs"),
            models_dir: PathBuf::from("models/checkpoints"),
            loras_dir: PathBuf::from("models/loras"),
            vaes_dir: PathBuf::from("models/vae"),
            styles_dir: PathBuf::from("sdxl_styles"),
            presets_dir: PathBuf::from("presets"),
            gpu_config_path: PathBuf::from("gpu_config.json"),
            editor_config_path: PathBuf::from("config.txt"),
            editor_tutorial_path: PathBuf::from("config_modification_tutorial.txt"),
            worker_command: vec!["python".to_string(), "worker.py".to_string()],
            worker_base_port: 7865,
            startup_probe_attempts: 60,
            startup_probe_cooldown: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
            sub_task_timeout: Duration::from_secs(30 * 60),
            rpc_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(30),
        }
    }
}

/// One GPU entry in the GPU table document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDeviceConfig {
    /// Physical device index
    pub device: u32,
    /// Display name shown in the UI
    #[serde(default)]
    pub name: Option<String>,
    /// Scheduling weight, at least 1
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

fn default_distribute() -> bool {
    true
}

/// GPU table document: `{enabled, distribute?, gpus:[{device, name, weight}]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Whether multi-GPU dispatch is enabled
    pub enabled: bool,
    /// Whether a single request may be split across GPUs
    #[serde(default = "default_distribute")]
    pub distribute: bool,
    /// GPU entries, in declaration order
    #[serde(default)]
    pub gpus: Vec<GpuDeviceConfig>,
}

impl GpuConfig {
    /// Load the GPU table from a JSON document. A missing file yields the
    /// single-GPU default rather than an error.
    pub fn load<P: AsRef<Path>>(path: P) -> OrchestratorResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "GPU config not found, using single-GPU default");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::Config(format!("failed to read GPU config: {}", e)))?;
        let config: GpuConfig = serde_json::from_str(&content)
            .map_err(|e| OrchestratorError::Config(format!("invalid GPU config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the GPU table
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.enabled && self.gpus.is_empty() {
            return Err(OrchestratorError::Config(
                "GPU config is enabled but lists no GPUs".to_string(),
            ));
        }
        for gpu in &self.gpus {
            if gpu.weight == 0 {
                return Err(OrchestratorError::Config(format!(
                    "GPU {} has weight 0; weights must be at least 1",
                    gpu.device
                )));
            }
        }
        let mut devices: Vec<u32> = self.gpus.iter().map(|g| g.device).collect();
        devices.sort_unstable();
        devices.dedup();
        if devices.len() != self.gpus.len() {
            return Err(OrchestratorError::Config(
                "GPU config lists a device more than once".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            distribute: true,
            gpus: vec![GpuDeviceConfig {
                device: 0,
                name: None,
                weight: 1,
            }],
        }
    }
}

/// The editable flat config document plus its discovered schema.
///
/// The schema is not hardcoded: it is read from a companion tutorial file, a
/// JSON document listing every known key with an example value. A key's type
/// in the tutorial is the type updates must carry. Applying an update
/// requires a restart; this module only persists the document.
pub struct EditorConfig {
    config_path: PathBuf,
    schema: BTreeMap<String, SchemaKind>,
}

/// JSON type class of a schema entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Bool,
    Number,
    String,
    Array,
    Object,
    Null,
}

impl SchemaKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => SchemaKind::Bool,
            Value::Number(_) => SchemaKind::Number,
            Value::String(_) => SchemaKind::String,
            Value::Array(_) => SchemaKind::Array,
            Value::Object(_) => SchemaKind::Object,
            Value::Null => SchemaKind::Null,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SchemaKind::Bool => "boolean",
            SchemaKind::Number => "number",
            SchemaKind::String => "string",
            SchemaKind::Array => "array",
            SchemaKind::Object => "object",
            SchemaKind::Null => "null",
        }
    }

    fn matches(self, value: &Value) -> bool {
        // Null is accepted anywhere: it means "reset to default".
        value.is_null() || SchemaKind::of(value) == self
    }
}

impl EditorConfig {
    /// Discover the schema from the tutorial file
    pub fn discover<P: AsRef<Path>, Q: AsRef<Path>>(
        config_path: P,
        tutorial_path: Q,
    ) -> OrchestratorResult<Self> {
        let content = std::fs::read_to_string(tutorial_path.as_ref()).map_err(|e| {
            OrchestratorError::Config(format!("failed to read config tutorial: {}", e))
        })?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| OrchestratorError::Config(format!("invalid config tutorial: {}", e)))?;
        let map = doc.as_object().ok_or_else(|| {
            OrchestratorError::Config("config tutorial must be a JSON object".to_string())
        })?;
        let schema = map
            .iter()
            .map(|(k, v)| (k.clone(), SchemaKind::of(v)))
            .collect();
        Ok(Self {
            config_path: config_path.as_ref().to_path_buf(),
            schema,
        })
    }

    /// Known keys, in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.schema.keys().cloned().collect()
    }

    /// Read the current document. A missing file is an empty document.
    pub fn read(&self) -> OrchestratorResult<serde_json::Map<String, Value>> {
        if !self.config_path.exists() {
            return Ok(serde_json::Map::new());
        }
        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| OrchestratorError::Config(format!("failed to read config: {}", e)))?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| OrchestratorError::Config(format!("invalid config document: {}", e)))?;
        match doc {
            Value::Object(map) => Ok(map),
            _ => Err(OrchestratorError::Config(
                "config document must be a JSON object".to_string(),
            )),
        }
    }

    /// Validate an update against the discovered schema. Unknown keys and
    /// wrong types are refusals, reported one at a time (first failure).
    pub fn validate_update(&self, update: &serde_json::Map<String, Value>) -> OrchestratorResult<()> {
        for (key, value) in update {
            let kind = self.schema.get(key).ok_or_else(|| {
                OrchestratorError::Validation(format!("unknown config key: {}", key))
            })?;
            if !kind.matches(value) {
                return Err(OrchestratorError::Validation(format!(
                    "config key {} expects {}, got {}",
                    key,
                    kind.name(),
                    SchemaKind::of(value).name()
                )));
            }
        }
        Ok(())
    }

    /// Merge a validated update into the document and persist it atomically
    /// (temp sibling + rename). Takes effect on restart.
    pub fn write(&self, update: serde_json::Map<String, Value>) -> OrchestratorResult<()> {
        self.validate_update(&update)?;
        let mut doc = self.read()?;
        for (key, value) in update {
            if value.is_null() {
                doc.remove(&key);
            } else {
                doc.insert(key, value);
            }
        }
        let serialized = serde_json::to_string_pretty(&Value::Object(doc))
            .map_err(|e| OrchestratorError::Internal(format!("serialize config: {}", e)))?;
        let tmp = self.config_path.with_extension("tmp");
        std::fs::write(&tmp, serialized)
            .map_err(|e| OrchestratorError::Config(format!("failed to write config: {}", e)))?;
        std::fs::rename(&tmp, &self.config_path)
            .map_err(|e| OrchestratorError::Config(format!("failed to replace config: {}", e)))?;
        Ok(())
    }
}
