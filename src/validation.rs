//! Validation Chain
//!
//! Five independent layers, cheapest and most disqualifying first. Every layer runs on
//! every pass so one run reports the full error set; the aggregate verdict gates the
//! Draft to Staged transition.

pub mod constraints;
pub mod quality;
pub mod readiness;
pub mod shape;
pub mod structural;

pub use constraints::ConstraintValidator;
pub use quality::QualityValidator;
pub use readiness::ReadinessValidator;
pub use shape::ShapeValidator;
pub use structural::{StructuralValidator, Taxonomy};

use crate::content::{
    body_digest, Artifact, ContentKind, ElementSpec, TaxonomyRefs, ValidationRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Identifier of a validation layer, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLayer {
    Structural,
    Shape,
    Quality,
    Constraints,
    Readiness,
}

impl ValidationLayer {
    pub const ALL: [ValidationLayer; 5] = [
        ValidationLayer::Structural,
        ValidationLayer::Shape,
        ValidationLayer::Quality,
        ValidationLayer::Constraints,
        ValidationLayer::Readiness,
    ];

    /// 1-based position in the chain.
    pub fn ordinal(self) -> u8 {
        match self {
            ValidationLayer::Structural => 1,
            ValidationLayer::Shape => 2,
            ValidationLayer::Quality => 3,
            ValidationLayer::Constraints => 4,
            ValidationLayer::Readiness => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationLayer::Structural => "structural",
            ValidationLayer::Shape => "shape",
            ValidationLayer::Quality => "quality",
            ValidationLayer::Constraints => "constraints",
            ValidationLayer::Readiness => "readiness",
        }
    }
}

impl std::fmt::Display for ValidationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of one layer over one body. `errors` is empty iff `passed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub layer: ValidationLayer,
    pub passed: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_errors(layer: ValidationLayer, errors: Vec<String>) -> Self {
        Self {
            layer,
            passed: errors.is_empty(),
            errors,
        }
    }
}

/// One independent check in the chain.
pub trait Validator: Send + Sync {
    fn layer(&self) -> ValidationLayer;

    /// Return every violation found; an empty list means the layer passed.
    fn validate(&self, artifact: &Artifact) -> Vec<String>;
}

/// Results of a full chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    pub results: Vec<ValidationResult>,
    pub passed: bool,
}

impl ChainReport {
    pub fn failed_layers(&self) -> Vec<ValidationLayer> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.layer)
            .collect()
    }

    pub fn result(&self, layer: ValidationLayer) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.layer == layer)
    }

    /// Freeze the report into a history record for `body`.
    pub fn into_record(self, body: &Value, run_at_ms: u64) -> ValidationRecord {
        ValidationRecord {
            run_at_ms,
            body_digest: body_digest(body),
            passed: self.passed,
            results: self.results,
        }
    }
}

/// The ordered five-layer chain.
pub struct ValidationChain {
    structural: StructuralValidator,
    layers: Vec<Box<dyn Validator>>,
}

impl ValidationChain {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        let structural = StructuralValidator::new(taxonomy);
        Self {
            layers: vec![
                Box::new(structural.clone()),
                Box::new(ShapeValidator),
                Box::new(QualityValidator),
                Box::new(ConstraintValidator),
                Box::new(ReadinessValidator),
            ],
            structural,
        }
    }

    /// Run all five layers against `artifact`.
    pub fn run_chain(&self, artifact: &Artifact) -> ChainReport {
        let results: Vec<ValidationResult> = self
            .layers
            .iter()
            .map(|validator| {
                let result =
                    ValidationResult::from_errors(validator.layer(), validator.validate(artifact));
                if !result.passed {
                    debug!(
                        artifact_id = %artifact.id,
                        layer = %result.layer,
                        errors = result.errors.len(),
                        "Validation layer failed"
                    );
                }
                result
            })
            .collect();

        let passed = results.iter().all(|r| r.passed);
        ChainReport { results, passed }
    }

    /// Layer 1 against a request, before any generation happens.
    pub fn preflight(&self, kind: ContentKind, taxonomy: &TaxonomyRefs) -> ValidationResult {
        ValidationResult::from_errors(
            ValidationLayer::Structural,
            self.structural.check_refs(kind, taxonomy, None),
        )
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        self.structural.taxonomy()
    }
}

pub(crate) fn body_object(artifact: &Artifact) -> Option<&Map<String, Value>> {
    artifact.body.as_object()
}

/// Present, non-null value of `name`.
pub(crate) fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|v| !v.is_null())
}

/// Object-valued entries of an element list, with their index.
pub(crate) fn elements<'a>(
    object: &'a Map<String, Value>,
    spec: &ElementSpec,
) -> Vec<(usize, &'a Map<String, Value>)> {
    field(object, spec.list_field)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.as_object().map(|o| (i, o)))
                .collect()
        })
        .unwrap_or_default()
}

/// Every string in a JSON tree, with a dotted path.
pub(crate) fn walk_strings<'a>(value: &'a Value, path: String, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(s) => out.push((path, s.as_str())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk_strings(item, format!("{}[{}]", path, i), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk_strings(item, child, out);
            }
        }
        _ => {}
    }
}
