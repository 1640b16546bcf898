//! Layer 4: strict types and field-level constraints.

use crate::content::{Artifact, ContentKind, FieldSpec, FieldType};
use crate::validation::{body_object, elements, field, ValidationLayer, Validator};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub struct ConstraintValidator;

fn check_fields(
    object: &Map<String, Value>,
    fields: &[FieldSpec],
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for spec in fields {
        let Some(value) = field(object, spec.name) else {
            continue;
        };
        match spec.ty {
            FieldType::Integer => {
                if value.is_number() && value.as_i64().is_none() && value.as_u64().is_none() {
                    errors.push(format!("{}{} must be a whole number", prefix, spec.name));
                }
            }
            FieldType::Text => {
                let Some(text) = value.as_str() else { continue };
                if let Some(max) = spec.max_chars {
                    let len = text.chars().count();
                    if len > max {
                        errors.push(format!(
                            "{}{} exceeds {} characters ({})",
                            prefix, spec.name, max, len
                        ));
                    }
                }
                if !spec.allowed.is_empty()
                    && !spec.allowed.iter().any(|a| a.eq_ignore_ascii_case(text.trim()))
                {
                    errors.push(format!(
                        "{}{} must be one of {}, got '{}'",
                        prefix,
                        spec.name,
                        spec.allowed.join(", "),
                        text
                    ));
                }
            }
            FieldType::List => {
                if let Some(items) = value.as_array() {
                    if let Some(i) = items.iter().position(|v| v.as_str().map(str::trim) == Some("")) {
                        errors.push(format!("{}{} entry {} is empty", prefix, spec.name, i + 1));
                    }
                }
            }
            FieldType::Number | FieldType::Boolean => {}
        }
    }
}

/// Duplicate values of `key` across elements, compared case-insensitively.
fn duplicates<'a>(entries: &[(usize, &'a Map<String, Value>)], key: &str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dupes = Vec::new();
    for (_, entry) in entries {
        if let Some(value) = field(entry, key).and_then(Value::as_str) {
            if !seen.insert(value.trim().to_lowercase()) {
                dupes.push(value);
            }
        }
    }
    dupes
}

/// Parse "HH:MM:SS,mmm" into milliseconds.
fn parse_srt_time(text: &str) -> Option<u64> {
    let (hms, millis) = text.trim().split_once(',')?;
    let mut parts = hms.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || h.len() != 2 || m.len() != 2 || s.len() != 2 || millis.len() != 3 {
        return None;
    }
    let (h, m, s, ms): (u64, u64, u64, u64) =
        (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?, millis.parse().ok()?);
    if m >= 60 || s >= 60 {
        return None;
    }
    Some(((h * 60 + m) * 60 + s) * 1000 + ms)
}

/// Validate an SRT cue range "HH:MM:SS,mmm --> HH:MM:SS,mmm".
pub fn check_timestamp_range(text: &str) -> Result<(u64, u64), String> {
    let (start, end) = text
        .split_once("-->")
        .ok_or_else(|| format!("'{}' is not a 'start --> end' range", text))?;
    let start = parse_srt_time(start).ok_or_else(|| format!("bad start time in '{}'", text))?;
    let end = parse_srt_time(end).ok_or_else(|| format!("bad end time in '{}'", text))?;
    if end < start {
        return Err(format!("'{}' ends before it starts", text));
    }
    Ok((start, end))
}

fn check_kind_rules(
    kind: ContentKind,
    entries: &[(usize, &Map<String, Value>)],
    errors: &mut Vec<String>,
) {
    match kind {
        ContentKind::Quiz => {
            for (i, q) in entries {
                let Some(options) = field(q, "options").and_then(Value::as_array) else {
                    continue;
                };
                let mut seen = HashSet::new();
                for option in options.iter().filter_map(Value::as_str) {
                    if !seen.insert(option.trim().to_lowercase()) {
                        errors.push(format!("question {}: duplicate option '{}'", i + 1, option));
                    }
                }
                if let Some(answer) = field(q, "answer").and_then(Value::as_u64) {
                    if answer as usize >= options.len() {
                        errors.push(format!(
                            "question {}: answer index {} is out of range for {} options",
                            i + 1,
                            answer,
                            options.len()
                        ));
                    }
                } else if field(q, "answer").and_then(Value::as_i64).is_some() {
                    errors.push(format!("question {}: answer index is negative", i + 1));
                }
            }
        }
        ContentKind::Course => {
            for (i, module) in entries {
                if let Some(minutes) = field(module, "duration_minutes").and_then(Value::as_i64) {
                    if minutes <= 0 {
                        errors.push(format!("module {}: duration_minutes must be positive", i + 1));
                    }
                }
            }
        }
        ContentKind::TranscriptCorrection => {
            for (i, entry) in entries {
                if let Some(ts) = field(entry, "timestamp").and_then(Value::as_str) {
                    if let Err(e) = check_timestamp_range(ts) {
                        errors.push(format!("entry {}: {}", i + 1, e));
                    }
                }
                if let Some(confidence) = field(entry, "confidence") {
                    match confidence.as_f64() {
                        Some(c) if (0.0..=1.0).contains(&c) => {}
                        _ => errors.push(format!(
                            "entry {}: confidence must be a number between 0 and 1",
                            i + 1
                        )),
                    }
                }
            }
        }
        ContentKind::Article | ContentKind::VideoScript => {}
    }
}

impl Validator for ConstraintValidator {
    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Constraints
    }

    fn validate(&self, artifact: &Artifact) -> Vec<String> {
        let Some(object) = body_object(artifact) else {
            return Vec::new();
        };
        let profile = artifact.kind.profile();
        let mut errors = Vec::new();
        check_fields(object, profile.fields, "", &mut errors);

        let Some(spec) = profile.elements else {
            return errors;
        };
        let entries = elements(object, &spec);
        for (i, entry) in &entries {
            check_fields(entry, spec.fields, &format!("{} {}: ", spec.label, i + 1), &mut errors);
        }
        if let Some(key) = spec.unique_by {
            for dupe in duplicates(&entries, key) {
                errors.push(format!("duplicate {} {} '{}'", spec.label, key, dupe));
            }
        }
        check_kind_rules(artifact.kind, &entries, &mut errors);
        errors
    }
}
