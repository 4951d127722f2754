//! Query text normalization and metadata sanitizing.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["“”]+"#).unwrap());
static AC_POSSESSIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Acceptance\s+Criteria['’]s?").unwrap());
static AC_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Acceptance\s+Criteria:+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const ACCEPTANCE_KEYS: [&str; 3] = ["acceptanceCriteria", "acceptance_criteria", "acceptance criteria"];

/// Flatten whitespace, quotes and bullets, and canonicalize "Acceptance Criteria" variants.
pub fn normalize_query_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let cleaned: String = text
        .chars()
        .map(|c| match c {
            '\t' | '•' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect();
    let cleaned = QUOTES.replace_all(&cleaned, " ");
    let cleaned = AC_POSSESSIVE.replace_all(&cleaned, "Acceptance Criteria");
    let cleaned = AC_COLON.replace_all(&cleaned, "Acceptance Criteria");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Recursively drop `embedding` keys. Everything else in a JSON value is already JSON-safe.
pub fn sanitize_metadata(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_metadata).collect()),
        other => other,
    }
}

pub fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(key, _)| key != "embedding")
        .map(|(key, value)| (key, sanitize_metadata(value)))
        .collect()
}

/// Apply [`normalize_query_text`] to acceptance-criteria string fields.
pub fn normalize_acceptance_metadata(mut metadata: Map<String, Value>) -> Map<String, Value> {
    for key in ACCEPTANCE_KEYS {
        if let Some(Value::String(text)) = metadata.get(key) {
            let normalized = normalize_query_text(text);
            metadata.insert(key.to_string(), Value::String(normalized));
        }
    }
    metadata
}

/// Sanitize then normalize, the form every outgoing metadata map takes.
pub fn clean_metadata(metadata: Map<String, Value>) -> Map<String, Value> {
    normalize_acceptance_metadata(sanitize_map(metadata))
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((end, _)) => format!("{}…", &text[..end]),
    }
}
