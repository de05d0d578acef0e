//! Positional-argument contract table
//!
//! The worker consumes generation requests as a fixed-length positional
//! vector. This table is the single source of truth for that contract: one
//! row per position with its name, type class, and default. The builder and
//! the validator are both derived from it. Any change to a row's position or
//! meaning requires bumping [`CONTRACT_VERSION`] and regenerating the golden
//! fixtures on both sides of the process boundary.

use serde_json::Value;

/// Version tag carried alongside every vector sent to a worker
pub const CONTRACT_VERSION: u32 = 1;

/// Required vector length
pub const EXPECTED_LENGTH: usize = 152;

/// Number of LoRA slots in the vector
pub const LORA_SLOT_COUNT: usize = 5;

/// Number of ControlNet image blocks in the vector
pub const CONTROLNET_IMAGE_COUNT: usize = 4;

/// Number of enhancement tabs in the vector
pub const ENHANCE_TAB_COUNT: usize = 3;

/// Type class of a positional slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Boolean flag
    Bool,
    /// String value
    Str,
    /// Sequence of strings
    StrList,
    /// Finite number
    Num,
    /// Image slot: null or a base64 string
    Image,
}

impl ArgKind {
    /// Human-readable name used in validation failures
    pub fn name(self) -> &'static str {
        match self {
            ArgKind::Bool => "boolean",
            ArgKind::Str => "string",
            ArgKind::StrList => "list of strings",
            ArgKind::Num => "finite number",
            ArgKind::Image => "image (null or string)",
        }
    }

    /// Whether a JSON value satisfies this slot's type class
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ArgKind::Bool => value.is_boolean(),
            ArgKind::Str => value.is_string(),
            ArgKind::StrList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            ArgKind::Num => value.as_f64().is_some_and(f64::is_finite),
            ArgKind::Image => value.is_null() || value.is_string(),
        }
    }
}

/// Compile-time default for a positional slot
#[derive(Debug, Clone, Copy)]
pub enum ArgDefault {
    Bool(bool),
    Str(&'static str),
    Int(i64),
    Float(f64),
    Null,
    List(&'static [&'static str]),
}

impl ArgDefault {
    /// Materialize the default as a JSON value
    pub fn to_value(&self) -> Value {
        match self {
            ArgDefault::Bool(b) => Value::Bool(*b),
            ArgDefault::Str(s) => Value::String((*s).to_string()),
            ArgDefault::Int(n) => Value::from(*n),
            ArgDefault::Float(n) => Value::from(*n),
            ArgDefault::Null => Value::Null,
            ArgDefault::List(items) => {
                Value::Array(items.iter().map(|s| Value::String((*s).to_string())).collect())
            }
        }
    }
}

/// One row of the positional contract
#[derive(Debug)]
pub struct ArgSpec {
    /// Field name; request fields of the same name map onto this slot
    pub name: &'static str,
    /// Type class enforced by the validator
    pub kind: ArgKind,
    /// Default applied when the request omits the field or sends a wrong type
    pub default: ArgDefault,
}

/// Closed set for the refiner swap method slot
pub const REFINER_SWAP_METHODS: &[&str] = &["joint", "separate", "vae"];

/// Closed set for the metadata scheme slot
pub const METADATA_SCHEMES: &[&str] = &["fooocus", "a1111"];

/// Default style selection
pub const DEFAULT_STYLES: &[&str] = &["Fooocus V2", "Fooocus Enhance", "Fooocus Sharp"];

const NO_STRINGS: &[&str] = &[];

/// The positional contract, version [`CONTRACT_VERSION`].
///
/// Position in this array is the wire position. Grouped the way the worker
/// consumes them; the group boundaries are part of the contract.
pub static ARG_TABLE: [ArgSpec; EXPECTED_LENGTH] = [
    // 0..=14: core generation parameters
    ArgSpec { name: "generate_image_grid", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "negative_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "style_selections", kind: ArgKind::StrList, default: ArgDefault::List(DEFAULT_STYLES) },
    ArgSpec { name: "performance_selection", kind: ArgKind::Str, default: ArgDefault::Str("Speed") },
    ArgSpec { name: "aspect_ratios_selection", kind: ArgKind::Str, default: ArgDefault::Str("1152×896") },
    ArgSpec { name: "image_number", kind: ArgKind::Num, default: ArgDefault::Int(1) },
    ArgSpec { name: "output_format", kind: ArgKind::Str, default: ArgDefault::Str("png") },
    ArgSpec { name: "image_seed", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    ArgSpec { name: "seed_random", kind: ArgKind::Bool, default: ArgDefault::Bool(true) },
    ArgSpec { name: "sharpness", kind: ArgKind::Num, default: ArgDefault::Float(2.0) },
    ArgSpec { name: "guidance_scale", kind: ArgKind::Num, default: ArgDefault::Float(4.0) },
    ArgSpec { name: "base_model_name", kind: ArgKind::Str, default: ArgDefault::Str("juggernautXL_v8Rundiffusion.safetensors") },
    ArgSpec { name: "refiner_model_name", kind: ArgKind::Str, default: ArgDefault::Str("None") },
    ArgSpec { name: "refiner_switch", kind: ArgKind::Num, default: ArgDefault::Float(0.5) },
    // 15..=29: five LoRA slots, (enabled, name, weight) each
    ArgSpec { name: "lora_1_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "lora_1_name", kind: ArgKind::Str, default: ArgDefault::Str("None") },
    ArgSpec { name: "lora_1_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "lora_2_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "lora_2_name", kind: ArgKind::Str, default: ArgDefault::Str("None") },
    ArgSpec { name: "lora_2_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "lora_3_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "lora_3_name", kind: ArgKind::Str, default: ArgDefault::Str("None") },
    ArgSpec { name: "lora_3_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "lora_4_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "lora_4_name", kind: ArgKind::Str, default: ArgDefault::Str("None") },
    ArgSpec { name: "lora_4_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "lora_5_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "lora_5_name", kind: ArgKind::Str, default: ArgDefault::Str("None") },
    ArgSpec { name: "lora_5_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    // 30..=37: input image / upscale-vary / inpaint sources
    ArgSpec { name: "input_image_checkbox", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "current_tab", kind: ArgKind::Str, default: ArgDefault::Str("uov") },
    ArgSpec { name: "uov_method", kind: ArgKind::Str, default: ArgDefault::Str("Disabled") },
    ArgSpec { name: "uov_input_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "outpaint_selections", kind: ArgKind::StrList, default: ArgDefault::List(NO_STRINGS) },
    ArgSpec { name: "inpaint_input_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "inpaint_additional_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "inpaint_mask_image", kind: ArgKind::Image, default: ArgDefault::Null },
    // 38..=55: advanced controls
    ArgSpec { name: "disable_preview", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "disable_intermediate_results", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "disable_seed_increment", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "black_out_nsfw", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "adm_scaler_positive", kind: ArgKind::Num, default: ArgDefault::Float(1.5) },
    ArgSpec { name: "adm_scaler_negative", kind: ArgKind::Num, default: ArgDefault::Float(0.8) },
    ArgSpec { name: "adm_scaler_end", kind: ArgKind::Num, default: ArgDefault::Float(0.3) },
    ArgSpec { name: "adaptive_cfg", kind: ArgKind::Num, default: ArgDefault::Float(7.0) },
    ArgSpec { name: "clip_skip", kind: ArgKind::Num, default: ArgDefault::Int(2) },
    ArgSpec { name: "sampler_name", kind: ArgKind::Str, default: ArgDefault::Str("dpmpp_2m_sde_gpu") },
    ArgSpec { name: "scheduler_name", kind: ArgKind::Str, default: ArgDefault::Str("karras") },
    ArgSpec { name: "vae_name", kind: ArgKind::Str, default: ArgDefault::Str("Default (model)") },
    ArgSpec { name: "overwrite_step", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    ArgSpec { name: "overwrite_switch", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    ArgSpec { name: "overwrite_width", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    ArgSpec { name: "overwrite_height", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    ArgSpec { name: "overwrite_vary_strength", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    ArgSpec { name: "overwrite_upscale_strength", kind: ArgKind::Num, default: ArgDefault::Int(-1) },
    // 56..=63: mixing and ControlNet preprocessor controls
    ArgSpec { name: "mixing_image_prompt_and_vary_upscale", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "mixing_image_prompt_and_inpaint", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "debugging_cn_preprocessor", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "skipping_cn_preprocessor", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "canny_low_threshold", kind: ArgKind::Num, default: ArgDefault::Int(64) },
    ArgSpec { name: "canny_high_threshold", kind: ArgKind::Num, default: ArgDefault::Int(128) },
    ArgSpec { name: "refiner_swap_method", kind: ArgKind::Str, default: ArgDefault::Str("joint") },
    ArgSpec { name: "controlnet_softness", kind: ArgKind::Num, default: ArgDefault::Float(0.25) },
    // 64..=68: FreeU
    ArgSpec { name: "freeu_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "freeu_b1", kind: ArgKind::Num, default: ArgDefault::Float(1.01) },
    ArgSpec { name: "freeu_b2", kind: ArgKind::Num, default: ArgDefault::Float(1.02) },
    ArgSpec { name: "freeu_s1", kind: ArgKind::Num, default: ArgDefault::Float(0.99) },
    ArgSpec { name: "freeu_s2", kind: ArgKind::Num, default: ArgDefault::Float(0.95) },
    // 69..=76: inpaint engine controls
    ArgSpec { name: "debugging_inpaint_preprocessor", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "inpaint_disable_initial_latent", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "inpaint_engine", kind: ArgKind::Str, default: ArgDefault::Str("v2.6") },
    ArgSpec { name: "inpaint_strength", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "inpaint_respective_field", kind: ArgKind::Num, default: ArgDefault::Float(0.618) },
    ArgSpec { name: "inpaint_advanced_masking_checkbox", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "invert_mask_checkbox", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "inpaint_erode_or_dilate", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    // 77..=79: output metadata
    ArgSpec { name: "save_final_enhanced_image_only", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "save_metadata_to_images", kind: ArgKind::Bool, default: ArgDefault::Bool(true) },
    ArgSpec { name: "metadata_scheme", kind: ArgKind::Str, default: ArgDefault::Str("fooocus") },
    // 80..=95: four ControlNet image blocks, (image, weight, stop, type) each
    ArgSpec { name: "cn_1_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "cn_1_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_1_stop", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_1_type", kind: ArgKind::Str, default: ArgDefault::Str("ImagePrompt") },
    ArgSpec { name: "cn_2_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "cn_2_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_2_stop", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_2_type", kind: ArgKind::Str, default: ArgDefault::Str("ImagePrompt") },
    ArgSpec { name: "cn_3_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "cn_3_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_3_stop", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_3_type", kind: ArgKind::Str, default: ArgDefault::Str("ImagePrompt") },
    ArgSpec { name: "cn_4_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "cn_4_weight", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_4_stop", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "cn_4_type", kind: ArgKind::Str, default: ArgDefault::Str("ImagePrompt") },
    // 96..=103: enhancement control block
    ArgSpec { name: "debugging_dino", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "dino_erode_or_dilate", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "debugging_enhance_masks_checkbox", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_input_image", kind: ArgKind::Image, default: ArgDefault::Null },
    ArgSpec { name: "enhance_checkbox", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_uov_method", kind: ArgKind::Str, default: ArgDefault::Str("Disabled") },
    ArgSpec { name: "enhance_uov_processing_order", kind: ArgKind::Str, default: ArgDefault::Str("Before First Enhancement") },
    ArgSpec { name: "enhance_uov_prompt_type", kind: ArgKind::Str, default: ArgDefault::Str("Original Prompts") },
    // 104..=151: three enhancement tabs, 16 entries each
    ArgSpec { name: "enhance_1_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_1_mask_dino_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_1_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_1_negative_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_1_mask_model", kind: ArgKind::Str, default: ArgDefault::Str("sam") },
    ArgSpec { name: "enhance_1_mask_cloth_category", kind: ArgKind::Str, default: ArgDefault::Str("full") },
    ArgSpec { name: "enhance_1_mask_sam_model", kind: ArgKind::Str, default: ArgDefault::Str("vit_b") },
    ArgSpec { name: "enhance_1_mask_text_threshold", kind: ArgKind::Num, default: ArgDefault::Float(0.25) },
    ArgSpec { name: "enhance_1_mask_box_threshold", kind: ArgKind::Num, default: ArgDefault::Float(0.3) },
    ArgSpec { name: "enhance_1_mask_sam_max_detections", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "enhance_1_inpaint_disable_initial_latent", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_1_inpaint_engine", kind: ArgKind::Str, default: ArgDefault::Str("v2.6") },
    ArgSpec { name: "enhance_1_inpaint_strength", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "enhance_1_inpaint_respective_field", kind: ArgKind::Num, default: ArgDefault::Float(0.618) },
    ArgSpec { name: "enhance_1_inpaint_erode_or_dilate", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "enhance_1_mask_invert", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_2_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_2_mask_dino_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_2_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_2_negative_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_2_mask_model", kind: ArgKind::Str, default: ArgDefault::Str("sam") },
    ArgSpec { name: "enhance_2_mask_cloth_category", kind: ArgKind::Str, default: ArgDefault::Str("full") },
    ArgSpec { name: "enhance_2_mask_sam_model", kind: ArgKind::Str, default: ArgDefault::Str("vit_b") },
    ArgSpec { name: "enhance_2_mask_text_threshold", kind: ArgKind::Num, default: ArgDefault::Float(0.25) },
    ArgSpec { name: "enhance_2_mask_box_threshold", kind: ArgKind::Num, default: ArgDefault::Float(0.3) },
    ArgSpec { name: "enhance_2_mask_sam_max_detections", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "enhance_2_inpaint_disable_initial_latent", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_2_inpaint_engine", kind: ArgKind::Str, default: ArgDefault::Str("v2.6") },
    ArgSpec { name: "enhance_2_inpaint_strength", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "enhance_2_inpaint_respective_field", kind: ArgKind::Num, default: ArgDefault::Float(0.618) },
    ArgSpec { name: "enhance_2_inpaint_erode_or_dilate", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "enhance_2_mask_invert", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_3_enabled", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_3_mask_dino_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_3_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_3_negative_prompt", kind: ArgKind::Str, default: ArgDefault::Str("") },
    ArgSpec { name: "enhance_3_mask_model", kind: ArgKind::Str, default: ArgDefault::Str("sam") },
    ArgSpec { name: "enhance_3_mask_cloth_category", kind: ArgKind::Str, default: ArgDefault::Str("full") },
    ArgSpec { name: "enhance_3_mask_sam_model", kind: ArgKind::Str, default: ArgDefault::Str("vit_b") },
    ArgSpec { name: "enhance_3_mask_text_threshold", kind: ArgKind::Num, default: ArgDefault::Float(0.25) },
    ArgSpec { name: "enhance_3_mask_box_threshold", kind: ArgKind::Num, default: ArgDefault::Float(0.3) },
    ArgSpec { name: "enhance_3_mask_sam_max_detections", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "enhance_3_inpaint_disable_initial_latent", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
    ArgSpec { name: "enhance_3_inpaint_engine", kind: ArgKind::Str, default: ArgDefault::Str("v2.6") },
    ArgSpec { name: "enhance_3_inpaint_strength", kind: ArgKind::Num, default: ArgDefault::Float(1.0) },
    ArgSpec { name: "enhance_3_inpaint_respective_field", kind: ArgKind::Num, default: ArgDefault::Float(0.618) },
    ArgSpec { name: "enhance_3_inpaint_erode_or_dilate", kind: ArgKind::Num, default: ArgDefault::Int(0) },
    ArgSpec { name: "enhance_3_mask_invert", kind: ArgKind::Bool, default: ArgDefault::Bool(false) },
];

/// Position of a named slot, if the name is part of the contract
pub fn index_of(name: &str) -> Option<usize> {
    ARG_TABLE.iter().position(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_length_matches_contract() {
        assert_eq!(ARG_TABLE.len(), EXPECTED_LENGTH);
    }

    #[test]
    fn table_names_are_unique() {
        let names: HashSet<&str> = ARG_TABLE.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), EXPECTED_LENGTH);
    }

    #[test]
    fn pinned_positions_hold() {
        // The low positions are consumed by index on the worker side; they
        // must never move within a contract version.
        assert_eq!(index_of("generate_image_grid"), Some(0));
        assert_eq!(index_of("prompt"), Some(1));
        assert_eq!(index_of("negative_prompt"), Some(2));
        assert_eq!(index_of("style_selections"), Some(3));
        assert_eq!(index_of("performance_selection"), Some(4));
        assert_eq!(index_of("aspect_ratios_selection"), Some(5));
        assert_eq!(index_of("image_number"), Some(6));
        assert_eq!(index_of("output_format"), Some(7));
        assert_eq!(index_of("image_seed"), Some(8));
        assert_eq!(index_of("seed_random"), Some(9));
        assert_eq!(index_of("sharpness"), Some(10));
        assert_eq!(index_of("guidance_scale"), Some(11));
        assert_eq!(index_of("base_model_name"), Some(12));
        assert_eq!(index_of("refiner_model_name"), Some(13));
        assert_eq!(index_of("refiner_switch"), Some(14));
        assert_eq!(index_of("lora_1_enabled"), Some(15));
        assert_eq!(index_of("lora_5_weight"), Some(29));
        assert_eq!(index_of("cn_1_image"), Some(80));
        assert_eq!(index_of("enhance_3_mask_invert"), Some(EXPECTED_LENGTH - 1));
    }

    #[test]
    fn defaults_satisfy_their_own_kinds() {
        for (index, spec) in ARG_TABLE.iter().enumerate() {
            let value = spec.default.to_value();
            assert!(
                spec.kind.accepts(&value),
                "slot {} ({}) default does not satisfy its kind",
                index,
                spec.name
            );
        }
    }
}
