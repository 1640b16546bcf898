//! Layer 3: content heuristics.
//!
//! Placeholder markers, minimum lengths, sub-element counts, register, and word bounds.
//! Text is NFKC-normalized first so full-width or ligature variants of a marker still match.

use crate::content::{Artifact, FieldSpec, FieldType, Register};
use crate::validation::{body_object, elements, field, walk_strings, ValidationLayer, Validator};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

/// Markers matched as whole words.
const PLACEHOLDER_WORDS: &[&str] = &["todo", "tbd", "tba", "fixme", "xxx"];

/// Markers matched anywhere in the text.
const PLACEHOLDER_FRAGMENTS: &[&str] = &[
    "lorem ipsum",
    "{{",
    "}}",
    "[insert",
    "<insert",
    "[placeholder",
    "<placeholder",
    "[your ",
    "<your ",
];

/// Openers that mark storytelling prose.
const NARRATIVE_MARKERS: &[&str] = &[
    "once upon a time",
    "long ago",
    "let me tell you a story",
    "i remember when",
    "our hero",
    "happily ever after",
    "the end.",
];

pub struct QualityValidator;

fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// First placeholder marker found in `text`, if any.
pub fn find_placeholder(text: &str) -> Option<&'static str> {
    let normalized = normalize(text);
    if let Some(fragment) = PLACEHOLDER_FRAGMENTS
        .iter()
        .find(|f| normalized.contains(*f))
    {
        return Some(fragment);
    }
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| PLACEHOLDER_WORDS.iter().find(|m| **m == word).copied())
}

fn find_narrative(text: &str) -> Option<&'static str> {
    let normalized = normalize(text);
    NARRATIVE_MARKERS
        .iter()
        .find(|m| normalized.contains(*m))
        .copied()
}

fn check_lengths(
    object: &Map<String, Value>,
    fields: &[FieldSpec],
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for spec in fields.iter().filter(|s| s.min_len > 0) {
        let Some(value) = field(object, spec.name) else {
            continue;
        };
        match (spec.ty, value) {
            (FieldType::Text, Value::String(s)) => {
                let len = s.trim().nfkc().count();
                if len < spec.min_len {
                    errors.push(format!(
                        "{}{} is too short ({} characters, minimum {})",
                        prefix, spec.name, len, spec.min_len
                    ));
                }
            }
            (FieldType::List, Value::Array(items)) if items.len() < spec.min_len => {
                errors.push(format!(
                    "{}{} needs at least {} entries, found {}",
                    prefix,
                    spec.name,
                    spec.min_len,
                    items.len()
                ));
            }
            _ => {}
        }
    }
}

impl Validator for QualityValidator {
    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Quality
    }

    fn validate(&self, artifact: &Artifact) -> Vec<String> {
        let Some(object) = body_object(artifact) else {
            return Vec::new();
        };
        let profile = artifact.kind.profile();
        let mut errors = Vec::new();

        let mut strings = Vec::new();
        walk_strings(&artifact.body, String::new(), &mut strings);
        for (path, text) in &strings {
            if let Some(marker) = find_placeholder(text) {
                errors.push(format!("{} contains placeholder marker '{}'", path, marker));
            }
        }

        check_lengths(object, profile.fields, "", &mut errors);

        if let Some(spec) = profile.elements {
            if let Some(entries) = field(object, spec.list_field).and_then(Value::as_array) {
                if entries.len() < spec.min_count {
                    errors.push(format!(
                        "needs at least {} {}s, found {}",
                        spec.min_count,
                        spec.label,
                        entries.len()
                    ));
                }
            }
            for (i, entry) in elements(object, &spec) {
                let prefix = format!("{} {}: ", spec.label, i + 1);
                check_lengths(entry, spec.fields, &prefix, &mut errors);
            }
        }

        if profile.register == Register::Instructional {
            for (path, text) in &strings {
                if let Some(marker) = find_narrative(text) {
                    errors.push(format!(
                        "{} reads as narrative ('{}'); {} content must be instructional",
                        path, marker, artifact.kind
                    ));
                }
            }
        }

        if let Some((name, min, max)) = profile.word_bounds {
            if let Some(text) = field(object, name).and_then(Value::as_str) {
                let words = text.split_whitespace().count();
                if words < min || words > max {
                    errors.push(format!(
                        "{} has {} words, expected {} to {}",
                        name, words, min, max
                    ));
                }
            }
        }

        errors
    }
}
