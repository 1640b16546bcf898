//! Layer 5: everything the publish collaborator needs is assigned.

use crate::content::Artifact;
use crate::validation::{body_object, field, ValidationLayer, Validator};
use serde_json::Value;

pub struct ReadinessValidator;

impl Validator for ReadinessValidator {
    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Readiness
    }

    fn validate(&self, artifact: &Artifact) -> Vec<String> {
        let mut errors = Vec::new();
        if artifact.id.is_nil() {
            errors.push("artifact id is not assigned".to_string());
        }
        if artifact.payload_ref.trim().is_empty() {
            errors.push("payload reference is empty".to_string());
        }
        if artifact.created_at_ms == 0 {
            errors.push("creation timestamp is not assigned".to_string());
        }
        if artifact.generated_at_ms.is_none() {
            errors.push("generation timestamp is not assigned".to_string());
        }

        let Some(object) = body_object(artifact) else {
            errors.push("body is not publishable".to_string());
            return errors;
        };
        for name in artifact.kind.profile().publish_fields {
            match field(object, name) {
                None => errors.push(format!("{} is required for publishing", name)),
                Some(Value::String(s)) if s.trim().is_empty() => {
                    errors.push(format!("{} is blank", name))
                }
                Some(_) => {}
            }
        }
        errors
    }
}
