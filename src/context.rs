//! Per-request correlation context and structured stage logging.
//!
//! A [`RequestContext`] is created when a hybrid search starts and is
//! threaded by reference through every stage. It owns the request's
//! `tracing` span; dropping it (on any exit path) releases the context.

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::Span;
use uuid::Uuid;

use crate::models::Document;
use crate::search::dedup::identifier_for;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?\d{1,3}[ -]?)?(?:\(\d{3}\)|\d{3})[ -]?\d{3}[ -]?\d{4}\b").unwrap()
});

const TOP_ITEMS: usize = 10;

#[derive(Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub query: String,
    pub limit: i64,
    span: Span,
}

impl RequestContext {
    pub fn new(query: &str, limit: i64) -> Self {
        let request_id = Uuid::new_v4();
        let (display_query, _) = redact_query(query);
        let span = tracing::info_span!(
            "hybrid_search",
            request_id = %request_id,
            query = %display_query,
            limit
        );
        Self {
            request_id,
            query: query.to_string(),
            limit,
            span,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        tracing::debug!(request_id = %self.request_id, "request context released");
    }
}

/// Queries carrying an email address or phone number are masked; very long ones are cut.
pub fn redact_query(query: &str) -> (String, bool) {
    if query.is_empty() {
        return (String::new(), false);
    }
    if EMAIL.is_match(query) || PHONE.is_match(query) {
        let head = crate::text::truncate_chars(query, 50);
        return (format!("[REDACTED] {head}"), true);
    }
    (crate::text::truncate_chars(query, 200), false)
}

/// Emit one structured event describing the documents leaving `stage`.
///
/// A second warning is logged when fewer documents than the request limit remain.
pub fn log_stage<'a, I>(ctx: &RequestContext, stage: &str, docs: I, duration_ms: Option<f64>)
where
    I: IntoIterator<Item = &'a Document>,
{
    let docs: Vec<&Document> = docs.into_iter().collect();
    let count = docs.len();
    let top_ids: Vec<String> = docs.iter().take(TOP_ITEMS).map(|d| identifier_for(d)).collect();
    let top_scores: Vec<f64> = docs.iter().take(TOP_ITEMS).map(|d| d.best_score()).collect();
    let (display_query, redacted) = redact_query(&ctx.query);
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let duration_ms = duration_ms.map(|ms| (ms * 100.0).round() / 100.0);

    tracing::info!(
        timestamp = %timestamp,
        request_id = %ctx.request_id,
        stage,
        query = %display_query,
        limit = ctx.limit,
        count,
        top_ids = ?top_ids,
        top_scores = ?top_scores,
        duration_ms = ?duration_ms,
        redacted,
        "stage complete"
    );

    if ctx.limit > 0 && (count as i64) < ctx.limit {
        tracing::warn!(
            timestamp = %timestamp,
            request_id = %ctx.request_id,
            stage,
            limit = ctx.limit,
            count,
            note = "results < limit",
            "stage under limit"
        );
    }
}
