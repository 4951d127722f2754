use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Map;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, Term};

use crate::models::{Document, StoredDocument};
use crate::search::{BranchResult, LexicalSearch};
use crate::text::clean_metadata;

/// BM25 search index built on tantivy.
///
/// Clones share one write lock: tantivy allows a single writer per index.
#[derive(Clone)]
pub struct Bm25Index {
    index: Index,
    write_lock: Arc<parking_lot::Mutex<()>>,
    // Field handles
    f_doc_id: Field,
    f_content: Field,
    f_metadata: Field,
}

impl Bm25Index {
    /// Create or open a BM25 index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        let f_doc_id = schema_builder.add_text_field("doc_id", STRING | STORED);
        let f_content = schema_builder.add_text_field("content", TEXT | STORED);
        let f_metadata = schema_builder.add_text_field("metadata", STORED);
        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, schema).context("Failed to create tantivy index")?
        };

        Ok(Self {
            index,
            write_lock: Arc::new(parking_lot::Mutex::new(())),
            f_doc_id,
            f_content,
            f_metadata,
        })
    }

    /// Index a batch of documents. Existing documents with the same id are replaced.
    pub fn index_documents(&self, docs: &[StoredDocument]) -> Result<()> {
        let _writer_guard = self.write_lock.lock();
        let mut writer = self.writer()?;

        for stored in docs {
            let metadata = serde_json::to_string(&stored.metadata)?;
            writer.delete_term(Term::from_field_text(self.f_doc_id, &stored.id));
            writer.add_document(doc!(
                self.f_doc_id => stored.id.clone(),
                self.f_content => stored.content.clone(),
                self.f_metadata => metadata,
            ))?;
        }

        writer.commit().context("Failed to commit index")?;
        writer
            .wait_merging_threads()
            .context("Failed to release index writer")?;
        Ok(())
    }

    /// Delete a document by id.
    pub fn delete_document(&self, doc_id: &str) -> Result<()> {
        let _writer_guard = self.write_lock.lock();
        let mut writer = self.writer()?;

        writer.delete_term(Term::from_field_text(self.f_doc_id, doc_id));
        writer.commit().context("Failed to commit delete")?;
        writer
            .wait_merging_threads()
            .context("Failed to release index writer")?;
        Ok(())
    }

    /// Open the index writer. Callers hold `write_lock` until it is released.
    fn writer(&self) -> Result<IndexWriter> {
        self.index
            .writer(50_000_000)
            .context("Failed to create index writer")
    }

    /// Number of live documents in the index.
    pub fn num_docs(&self) -> Result<u64> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;
        Ok(reader.searcher().num_docs())
    }

    /// Search the index, returning scored hits plus the total match count.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<(Vec<Document>, usize)> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok((Vec::new(), 0));
        }

        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create reader")?;

        let searcher = reader.searcher();

        // Lenient parsing: free text from users routinely contains query syntax characters.
        let query_parser = QueryParser::for_index(&self.index, vec![self.f_content]);
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Lenient query parse dropped {} fragment(s)", errors.len());
        }

        let (top_docs, total) = searcher
            .search(&query, &(TopDocs::with_limit(limit), Count))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());

        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let doc_id = doc
                .get_first(self.f_doc_id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let content = doc
                .get_first(self.f_content)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let mut metadata: Map<String, serde_json::Value> = doc
                .get_first(self.f_metadata)
                .and_then(|v| v.as_str())
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();
            if !doc_id.is_empty() {
                metadata.insert("_id".to_string(), serde_json::Value::String(doc_id));
            }

            hits.push(
                Document::new(content, f64::from(score)).with_metadata(clean_metadata(metadata)),
            );
        }

        Ok((hits, total))
    }
}

#[async_trait]
impl LexicalSearch for Bm25Index {
    async fn search(&self, query: &str, limit: usize) -> crate::error::Result<BranchResult> {
        let index = self.clone();
        let query = query.to_string();
        let (documents, total) =
            tokio::task::spawn_blocking(move || Bm25Index::search(&index, &query, limit))
                .await
                .context("BM25 search task failed")??;
        Ok(BranchResult {
            documents,
            total,
            operator: None,
        })
    }
}
