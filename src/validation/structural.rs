//! Layer 1: cross-reference pre-check.
//!
//! Runs both before generation (against the request) and after (against the artifact).

use crate::content::{Artifact, ContentKind, TaxonomyRefs};
use crate::validation::{body_object, field, ValidationLayer, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Known categories and the subcategories filed under each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    pub fn new(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self { categories }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.categories.contains_key(category_id)
    }

    pub fn has_subcategory(&self, category_id: &str, subcategory_id: &str) -> bool {
        self.categories
            .get(category_id)
            .is_some_and(|subs| subs.iter().any(|s| s == subcategory_id))
    }
}

#[derive(Debug, Clone)]
pub struct StructuralValidator {
    taxonomy: Arc<Taxonomy>,
}

impl StructuralValidator {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Check taxonomy references, and when a body is given, that it agrees with them.
    pub fn check_refs(
        &self,
        kind: ContentKind,
        refs: &TaxonomyRefs,
        body: Option<&Value>,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        let category = refs.category_id.as_deref().map(str::trim);
        let subcategory = refs.subcategory_id.as_deref().map(str::trim);

        match (category, subcategory) {
            (None, Some(sub)) => errors.push(format!(
                "subcategory '{}' given without a category",
                sub
            )),
            (None, None) if !self.taxonomy.is_empty() => {
                errors.push(format!("a category is required for {} content", kind))
            }
            (Some(cat), _) if cat.is_empty() => errors.push("category id is empty".to_string()),
            (Some(cat), sub) => {
                if !self.taxonomy.has_category(cat) {
                    errors.push(format!("unknown category '{}'", cat));
                } else if let Some(sub) = sub {
                    if !self.taxonomy.has_subcategory(cat, sub) {
                        errors.push(format!(
                            "subcategory '{}' does not belong to category '{}'",
                            sub, cat
                        ));
                    }
                }
            }
            (None, None) => {}
        }

        let Some(object) = body.and_then(Value::as_object) else {
            return errors;
        };

        if let Some(declared) = field(object, "kind").and_then(Value::as_str) {
            if declared.parse::<ContentKind>().ok() != Some(kind) {
                errors.push(format!(
                    "body declares kind '{}' but artifact is {}",
                    declared, kind
                ));
            }
        }
        if let Some(declared) = field(object, "category_id").and_then(Value::as_str) {
            if Some(declared) != category {
                errors.push(format!(
                    "body declares category '{}' but artifact is filed under '{}'",
                    declared,
                    category.unwrap_or("none")
                ));
            }
        }
        errors
    }
}

impl Validator for StructuralValidator {
    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Structural
    }

    fn validate(&self, artifact: &Artifact) -> Vec<String> {
        let body = body_object(artifact).map(|_| &artifact.body);
        self.check_refs(artifact.kind, &artifact.taxonomy, body)
    }
}
