//! Document identity and duplicate removal.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::models::{Branch, Document};
use crate::text::clean_metadata;

/// Hex chars of the content hash kept as identity (64 bits).
const CONTENT_HASH_LEN: usize = 16;

/// Stable identity of a document: its metadata `_id` if present, else a truncated SHA-256 of the content.
pub fn identifier_for(doc: &Document) -> String {
    match doc.metadata.get("_id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(id) if is_truthy(id) => id.to_string(),
        _ => content_hash(&doc.content),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..CONTENT_HASH_LEN].to_string()
}

/// Identity set shared across dedup passes.
#[derive(Debug, Default)]
struct SeenIds(HashSet<String>);

impl SeenIds {
    /// Keep the first occurrence of every identity not already seen, in order.
    fn retain_unseen(&mut self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter()
            .filter(|doc| self.0.insert(identifier_for(doc)))
            .collect()
    }
}

/// Dedup both branches against one identity set, lexical first, so overlap is attributed to the lexical branch.
pub fn dedup_branches(
    lexical: Vec<Document>,
    vector: Vec<Document>,
) -> (Vec<Document>, Vec<Document>) {
    let mut seen = SeenIds::default();
    let lexical = seen.retain_unseen(lexical);
    let vector = seen.retain_unseen(vector);
    (lexical, vector)
}

/// Dedup, stopping as soon as `limit` unique documents are collected.
pub fn deduplicate_and_trim(docs: Vec<Document>, limit: usize) -> Vec<Document> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::with_capacity(limit.min(docs.len()));
    if limit == 0 {
        return deduped;
    }
    for doc in docs {
        if !seen.insert(identifier_for(&doc)) {
            continue;
        }
        deduped.push(doc);
        if deduped.len() == limit {
            break;
        }
    }
    deduped
}

/// Final shaping of a surviving document: tag its source, drop the
/// intermediate normalized score and clean the metadata.
pub fn prepare_document(mut doc: Document, source: Branch) -> Document {
    doc.source = Some(source);
    doc.norm_score = None;
    doc.metadata = clean_metadata(std::mem::take(&mut doc.metadata));
    doc
}
