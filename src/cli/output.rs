//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::PipelineError;

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::Preflight(result) => {
            let mut s = format!("Request rejected ({} layer):", result.layer);
            for err in &result.errors {
                s.push_str(&format!("\n  - {}", err));
            }
            s
        }
        other => other.to_string(),
    }
}

/// Pretty JSON, falling back to an empty object.
pub fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
