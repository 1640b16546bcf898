//! Layer 2: body shape against the kind's schema.

use crate::content::{Artifact, FieldSpec, FieldType};
use crate::validation::{body_object, field, ValidationLayer, Validator};
use serde_json::{Map, Value};

pub struct ShapeValidator;

fn has_type(value: &Value, ty: FieldType) -> bool {
    match ty {
        FieldType::Text => value.is_string(),
        FieldType::Integer | FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::List => value.is_array(),
    }
}

fn check_fields(
    object: &Map<String, Value>,
    fields: &[FieldSpec],
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for spec in fields {
        match field(object, spec.name) {
            None => errors.push(format!("{}{} is missing", prefix, spec.name)),
            Some(value) if !has_type(value, spec.ty) => errors.push(format!(
                "{}{} must be {}",
                prefix,
                spec.name,
                spec.ty.describe()
            )),
            Some(_) => {}
        }
    }
}

impl Validator for ShapeValidator {
    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Shape
    }

    fn validate(&self, artifact: &Artifact) -> Vec<String> {
        let Some(object) = body_object(artifact) else {
            return vec!["body must be a JSON object".to_string()];
        };
        let profile = artifact.kind.profile();
        let mut errors = Vec::new();
        check_fields(object, profile.fields, "", &mut errors);

        let Some(elements) = profile.elements else {
            return errors;
        };
        let Some(entries) = field(object, elements.list_field).and_then(Value::as_array) else {
            return errors;
        };
        for (i, entry) in entries.iter().enumerate() {
            let prefix = format!("{} {}: ", elements.label, i + 1);
            match entry.as_object() {
                Some(entry) => check_fields(entry, elements.fields, &prefix, &mut errors),
                None => errors.push(format!("{}{} must be an object", prefix, elements.label)),
            }
        }
        errors
    }
}
