//! Task-args builder and validator
//!
//! Translates a structured generation request into the fixed-length
//! positional vector the worker consumes, and validates inbound vectors.
//! Both directions are derived from the contract table in [`table`]:
//! construction never fails (the table default covers an absent or
//! wrong-typed field), validation yields a structured refusal surfaced as a
//! 400-class error before any worker is contacted.

pub mod table;

use crate::error::{OrchestratorError, OrchestratorResult};
use serde_json::Value;

pub use table::{ArgKind, CONTRACT_VERSION, EXPECTED_LENGTH, LORA_SLOT_COUNT};
use table::{ARG_TABLE, METADATA_SCHEMES, REFINER_SWAP_METHODS};

/// Request field carrying a raw pre-built vector, bypassing the builder
pub const RAW_ARGS_FIELD: &str = "fooocus_args";

/// A structured generation request.
///
/// Backed by the raw JSON object so that wrong-typed fields degrade to the
/// contract default instead of failing deserialization.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    fields: serde_json::Map<String, Value>,
}

impl GenerationRequest {
    /// Wrap a JSON body. Anything but an object is a validation refusal.
    pub fn from_value(value: Value) -> OrchestratorResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(OrchestratorError::Validation(format!(
                "request body must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Field lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Insert or overwrite a field
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Requested image count, at least 1
    pub fn image_number(&self) -> u32 {
        self.fields
            .get("image_number")
            .and_then(Value::as_u64)
            .map(|n| n.max(1) as u32)
            .unwrap_or(1)
    }

    /// Whether the seed should be randomized (absent means yes)
    pub fn seed_random(&self) -> bool {
        self.fields
            .get("seed_random")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Explicit non-negative seed, when one was provided
    pub fn image_seed(&self) -> Option<i64> {
        self.fields
            .get("image_seed")
            .and_then(Value::as_i64)
            .filter(|seed| *seed >= 0)
    }

    /// Raw vector passthrough, when the client built its own args
    pub fn raw_args(&self) -> Option<&Vec<Value>> {
        self.fields.get(RAW_ARGS_FIELD).and_then(Value::as_array)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize an aspect-ratio string: any of `x`, `X`, `*` becomes the
/// multiplication sign the worker splits on.
pub fn normalize_aspect_ratio(raw: &str) -> String {
    raw.replace(['x', 'X', '*'], "×")
}

fn closed_set_or_default(value: &str, allowed: &[&str], default: &'static str) -> String {
    if allowed.contains(&value) {
        value.to_string()
    } else {
        default.to_string()
    }
}

/// Build the positional vector for a request.
///
/// One pass over the contract table: a request field with the slot's name and
/// an acceptable type is taken verbatim, anything else falls back to the slot
/// default. The LoRA list and a few normalized slots are special-cased after
/// the generic pass.
pub fn build(request: &GenerationRequest) -> Vec<Value> {
    let mut args: Vec<Value> = ARG_TABLE
        .iter()
        .map(|spec| match request.get(spec.name) {
            Some(value) if spec.kind.accepts(value) => value.clone(),
            _ => spec.default.to_value(),
        })
        .collect();

    set_slot(&mut args, "image_number", Value::from(request.image_number()));

    if let Some(Value::String(raw)) = request.get("aspect_ratios_selection") {
        set_slot(
            &mut args,
            "aspect_ratios_selection",
            Value::String(normalize_aspect_ratio(raw)),
        );
    }

    if let Some(Value::String(method)) = request.get("refiner_swap_method") {
        set_slot(
            &mut args,
            "refiner_swap_method",
            Value::String(closed_set_or_default(method, REFINER_SWAP_METHODS, "joint")),
        );
    }

    if let Some(Value::String(scheme)) = request.get("metadata_scheme") {
        set_slot(
            &mut args,
            "metadata_scheme",
            Value::String(closed_set_or_default(scheme, METADATA_SCHEMES, "fooocus")),
        );
    }

    if let Some(Value::Array(loras)) = request.get("loras") {
        apply_loras(&mut args, loras);
    }

    args
}

fn set_slot(args: &mut [Value], name: &str, value: Value) {
    if let Some(index) = table::index_of(name) {
        args[index] = value;
    }
}

/// Fill the five `(enabled, name, weight)` LoRA slots from a request list,
/// padding or truncating to the fixed count.
fn apply_loras(args: &mut [Value], loras: &[Value]) {
    for slot in 0..LORA_SLOT_COUNT {
        let n = slot + 1;
        let entry = loras.get(slot).and_then(Value::as_object);

        let enabled = entry
            .and_then(|e| e.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let name = entry
            .and_then(|e| e.get("model_name"))
            .and_then(Value::as_str)
            .unwrap_or("None")
            .to_string();
        let weight = entry
            .and_then(|e| e.get("weight"))
            .and_then(Value::as_f64)
            .filter(|w| w.is_finite())
            .unwrap_or(1.0);

        set_slot(args, &format!("lora_{}_enabled", n), Value::Bool(enabled));
        set_slot(args, &format!("lora_{}_name", n), Value::String(name));
        set_slot(args, &format!("lora_{}_weight", n), Value::from(weight));
    }
}

/// Pin the per-sub-task fields on an already-validated vector. Applied after
/// the split so each worker sees its own image count and seed with
/// randomization disabled, whether the vector was built or passed raw.
pub fn apply_fan_out(args: &mut [Value], image_count: u32, seed: i64) {
    set_slot(args, "image_number", Value::from(image_count));
    set_slot(args, "image_seed", Value::from(seed));
    set_slot(args, "seed_random", Value::Bool(false));
}

/// Validate a positional vector against the contract table.
///
/// Length is checked first so a truncated or over-long vector is reported
/// with the expected length; then every slot is checked against its type
/// class, reporting the first failure.
pub fn validate(args: &[Value]) -> OrchestratorResult<()> {
    if args.len() != EXPECTED_LENGTH {
        return Err(OrchestratorError::Validation(format!(
            "args vector has length {}, expected {}",
            args.len(),
            EXPECTED_LENGTH
        )));
    }
    for (index, (value, spec)) in args.iter().zip(ARG_TABLE.iter()).enumerate() {
        if !spec.kind.accepts(value) {
            return Err(OrchestratorError::Validation(format!(
                "args[{}] ({}) must be a {}, got {}",
                index,
                spec.name,
                spec.kind.name(),
                json_type_name(value)
            )));
        }
    }
    Ok(())
}

/// Resolve the vector for a request: a raw passthrough is validated and used
/// verbatim, otherwise the builder output is validated and returned.
pub fn resolve(request: &GenerationRequest) -> OrchestratorResult<Vec<Value>> {
    match request.raw_args() {
        Some(raw) => {
            validate(raw)?;
            Ok(raw.clone())
        }
        None => {
            let args = build(request);
            validate(&args)?;
            Ok(args)
        }
    }
}
