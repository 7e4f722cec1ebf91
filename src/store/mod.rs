//! Storage abstraction for the vector index.
//!
//! The [`Store`] trait covers the read side needed by search and
//! retrieval. Writes go through [`Coordinator`](crate::coordinator::Coordinator),
//! which owns the transactional units of work.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteStore`] | Production; brute-force distance over BLOB vectors |
//! | [`InMemoryStore`] | Tests and embedding in other processes |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::Result;
use crate::models::{ContentType, DocumentRecord, SearchHit};

/// Parameters for a single nearest-neighbour scan.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestQuery {
    /// Restrict to one content type; `None` scans everything.
    pub content_type: Option<ContentType>,
    /// Inclusive distance cutoff.
    pub max_distance: f64,
    pub limit: usize,
}

/// Document row plus its chunks in index order.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: DocumentRecord,
    pub chunks: Vec<ChunkResponse>,
}

/// A single chunk of a document.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub id: String,
    pub index: i64,
    pub total: i64,
    pub content: String,
    pub original_language: String,
    pub was_translated: bool,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Read access to stored embeddings.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`nearest`](Store::nearest) | Records within a distance of a query vector |
/// | [`get_document`](Store::get_document) | Document row with chunks |
/// | [`document_chunks`](Store::document_chunks) | Chunks only, by index |
#[async_trait]
pub trait Store: Send + Sync {
    /// Records whose distance to `query` is `<= params.max_distance`,
    /// ranked by [`rank_hits`] and truncated to `params.limit`.
    ///
    /// Chunks of a document whose recorded total does not match the chunk's
    /// own total are never returned.
    async fn nearest(&self, query: &[f32], params: &NearestQuery) -> Result<Vec<SearchHit>>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>>;

    /// Chunks of a document ordered by `chunk_index`; empty when unknown.
    async fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkResponse>>;
}

/// Order hits by ascending distance, then newer `created_at`, then id,
/// and keep the first `limit`.
pub fn rank_hits(hits: &mut Vec<SearchHit>, limit: usize) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
}
