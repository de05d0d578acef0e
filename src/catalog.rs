//! Catalog reader
//!
//! Enumerates the model/LoRA/VAE/style/preset inventory the UI needs to
//! populate its controls. Recomputed from disk on every request: calls are
//! rare (UI startup) and the inventory is small, so there is no caching
//! layer to invalidate.

use crate::args::table::{DEFAULT_STYLES, METADATA_SCHEMES, REFINER_SWAP_METHODS};
use crate::config::ServerConfig;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Aspect ratios offered to the UI, `W×H`
pub const ASPECT_RATIOS: &[&str] = &[
    "704×1408", "704×1344", "768×1344", "768×1280", "832×1216", "832×1152", "896×1152",
    "896×1088", "960×1088", "960×1024", "1024×1024", "1024×960", "1088×960", "1088×896",
    "1152×896", "1152×832", "1216×832", "1280×768", "1344×768", "1344×704", "1408×704",
    "1472×704", "1536×640", "1600×640", "1664×576", "1728×576",
];

/// Performance presets
pub const PERFORMANCE_OPTIONS: &[&str] =
    &["Quality", "Speed", "Extreme Speed", "Lightning", "Hyper-SD"];

/// Samplers the worker understands
pub const SAMPLERS: &[&str] = &[
    "euler", "euler_ancestral", "heun", "heunpp2", "dpm_2", "dpm_2_ancestral", "lms",
    "dpm_fast", "dpm_adaptive", "dpmpp_2s_ancestral", "dpmpp_sde", "dpmpp_sde_gpu",
    "dpmpp_2m", "dpmpp_2m_sde", "dpmpp_2m_sde_gpu", "dpmpp_3m_sde", "dpmpp_3m_sde_gpu",
    "ddpm", "ddim", "uni_pc", "uni_pc_bh2",
];

/// Diffusion schedulers
pub const SCHEDULERS: &[&str] = &[
    "normal", "karras", "exponential", "sgm_uniform", "simple", "ddim_uniform", "lcm",
    "turbo", "align_your_steps", "tcd", "edm_playground_v2.5",
];

/// Output image formats
pub const OUTPUT_FORMATS: &[&str] = &["png", "jpeg", "webp"];

/// File extensions recognized as model artifacts
const MODEL_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pt", "pth", "gguf"];

/// VAE entry meaning "use the checkpoint's own VAE"
const DEFAULT_VAE: &str = "Default (model)";

/// Styles that exist without a style file
const PSEUDO_STYLES: &[&str] = &["Fooocus V2", "Random Style"];

/// Everything the UI needs to populate its controls
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub models: Vec<String>,
    pub loras: Vec<String>,
    pub vaes: Vec<String>,
    pub presets: Vec<String>,
    pub styles: Vec<String>,
    pub default_styles: Vec<String>,
    pub aspect_ratios: Vec<String>,
    pub performance_options: Vec<String>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
    pub output_formats: Vec<String>,
    pub clip_skip_max: u8,
    pub default_lora_count: usize,
    pub refiner_swap_methods: Vec<String>,
    pub metadata_schemes: Vec<String>,
}

/// Filesystem-backed catalog
pub struct CatalogReader {
    config: Arc<ServerConfig>,
}

impl CatalogReader {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Build a fresh snapshot from disk
    pub fn snapshot(&self) -> CatalogSnapshot {
        let mut vaes = vec![DEFAULT_VAE.to_string()];
        vaes.extend(scan_model_files(&self.config.vaes_dir));

        CatalogSnapshot {
            models: scan_model_files(&self.config.models_dir),
            loras: scan_model_files(&self.config.loras_dir),
            vaes,
            presets: scan_json_stems(&self.config.presets_dir),
            styles: load_styles(&self.config.styles_dir),
            default_styles: owned(DEFAULT_STYLES),
            aspect_ratios: owned(ASPECT_RATIOS),
            performance_options: owned(PERFORMANCE_OPTIONS),
            samplers: owned(SAMPLERS),
            schedulers: owned(SCHEDULERS),
            output_formats: owned(OUTPUT_FORMATS),
            clip_skip_max: 12,
            default_lora_count: crate::args::LORA_SLOT_COUNT,
            refiner_swap_methods: owned(REFINER_SWAP_METHODS),
            metadata_schemes: owned(METADATA_SCHEMES),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Sorted filenames with a model extension; a missing directory is empty
fn scan_model_files(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let has_model_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| MODEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !has_model_ext {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    names
}

/// Sorted stems of `*.json` files; a missing directory is empty
fn scan_json_stems(dir: &Path) -> Vec<String> {
    let mut stems = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return stems;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    stems
}

/// Collect style names from every style file, skipping files that fail to
/// parse, then append the pseudo-styles that exist without a file.
fn load_styles(dir: &Path) -> Vec<String> {
    let mut styles = Vec::new();

    let mut files: Vec<std::path::PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();

    for path in files {
        match read_style_file(&path) {
            Ok(names) => styles.extend(names),
            Err(reason) => {
                tracing::warn!(path = %path.display(), reason, "skipping unreadable style file");
            }
        }
    }

    for pseudo in PSEUDO_STYLES {
        if !styles.iter().any(|s| s == pseudo) {
            styles.push(pseudo.to_string());
        }
    }
    styles
}

fn read_style_file(path: &Path) -> Result<Vec<String>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let doc: Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
    let items = doc.as_array().ok_or("style file is not a JSON array")?;
    Ok(items
        .iter()
        .filter_map(|item| item.get("name").and_then(Value::as_str))
        .map(|name| name.to_string())
        .collect())
}
