//! Node.js bindings for the deterministic core.
//!
//! JSON in, JSON out, using the camelCase outbound contract. Network calls
//! stay on the Rust side; the host only fuses and normalizes.

use napi_derive::napi;

use concord_core::{BackendResponse, BackendWeights, ConsensusResult};

fn invalid_input(what: &str, e: impl std::fmt::Display) -> napi::Error {
    napi::Error::new(napi::Status::InvalidArg, format!("Invalid {}: {}", what, e))
}

/// Fuse backend responses into a consensus result.
///
/// `weightsJson` is an optional `{"backendId": weight}` object; the default
/// three-backend table is used when it is omitted. A single response comes
/// back as `single-fallback`, the same as `concord fuse`.
#[napi]
pub fn fuse(responses_json: String, weights_json: Option<String>) -> napi::Result<String> {
    fuse_json(&responses_json, weights_json.as_deref())
}

/// Map a consensus result onto the downstream report shape.
#[napi]
pub fn normalize(consensus_json: String) -> napi::Result<String> {
    normalize_json(&consensus_json)
}

fn fuse_json(responses_json: &str, weights_json: Option<&str>) -> napi::Result<String> {
    let responses: Vec<BackendResponse> =
        serde_json::from_str(responses_json).map_err(|e| invalid_input("responses", e))?;

    let weights = match weights_json {
        Some(json) => {
            let table: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(json).map_err(|e| invalid_input("weights", e))?;
            let entries = table
                .into_iter()
                .map(|(id, weight)| {
                    weight
                        .as_f64()
                        .map(|w| (id.clone(), w))
                        .ok_or_else(|| invalid_input("weights", format!("'{}' is not a number", id)))
                })
                .collect::<napi::Result<Vec<_>>>()?;
            BackendWeights::new(entries).map_err(|e| invalid_input("weights", e))?
        }
        None => BackendWeights::default(),
    };

    let consensus = concord_core::fuse_with_weights(&responses, &weights)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&consensus).map_err(|e| napi::Error::from_reason(e.to_string()))
}

fn normalize_json(consensus_json: &str) -> napi::Result<String> {
    let consensus: ConsensusResult =
        serde_json::from_str(consensus_json).map_err(|e| invalid_input("consensus", e))?;
    let report = concord_core::normalize(&consensus);
    serde_json::to_string(&report).map_err(|e| napi::Error::from_reason(e.to_string()))
}
