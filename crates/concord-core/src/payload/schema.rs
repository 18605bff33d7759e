//! JSON Schema check for backend payloads.
//!
//! Backends may omit any field, but a field that is present must have the
//! right shape. A string where a score belongs is a malformed payload, not a
//! missing one.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded payload schema (loaded at compile time).
const PAYLOAD_SCHEMA_JSON: &str = include_str!("../../schema/backend_payload.schema.json");

/// Compiled validator (initialized once, reused across requests).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from loading the schema itself.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load payload schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(PAYLOAD_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a payload against the schema.
///
/// Returns every violation as `"<message> at <json pointer>"`.
pub fn validate_payload_schema(payload: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
