//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Records live in `Vec`/`HashMap` behind `std::sync::RwLock`. Search is a
//! brute-force scan with the configured [`DistanceMetric`]. A poisoned lock
//! is recovered rather than propagated: the data is append-only, so a
//! panicking writer cannot leave it half-updated.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::embedding::DistanceMetric;
use crate::error::{Error, Result};
use crate::models::{format_ts_iso, similarity_from_distance, DocumentRecord, EmbeddingRecord, SearchHit};

use super::{rank_hits, ChunkResponse, DocumentResponse, NearestQuery, Store};

/// In-memory store.
pub struct InMemoryStore {
    metric: DistanceMetric,
    records: RwLock<Vec<EmbeddingRecord>>,
    documents: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryStore {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            records: RwLock::new(Vec::new()),
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Append a record. The first record fixes the store's dimensionality.
    pub fn insert_record(&self, record: EmbeddingRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = records.first() {
            if first.vector.len() != record.vector.len() {
                return Err(Error::validation(format!(
                    "vector has {} dimensions, store holds {}",
                    record.vector.len(),
                    first.vector.len()
                )));
            }
        }
        records.push(record);
        Ok(())
    }

    pub fn insert_document(&self, document: DocumentRecord) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.id.clone(), document);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn visible(&self, record: &EmbeddingRecord, documents: &HashMap<String, DocumentRecord>) -> bool {
        match &record.document_id {
            None => true,
            Some(doc_id) => documents
                .get(doc_id)
                .is_some_and(|d| Some(d.total_chunks) == record.chunk_total),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

fn chunk_response(record: &EmbeddingRecord) -> ChunkResponse {
    ChunkResponse {
        id: record.id.clone(),
        index: record.chunk_index.unwrap_or_default(),
        total: record.chunk_total.unwrap_or_default(),
        content: record.content.clone(),
        original_language: record.original_language.clone(),
        was_translated: record.was_translated,
        metadata: record.metadata.clone(),
        created_at: format_ts_iso(record.created_at),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn nearest(&self, query: &[f32], params: &NearestQuery) -> Result<Vec<SearchHit>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);

        let mut hits: Vec<SearchHit> = records
            .iter()
            .filter(|r| params.content_type.map_or(true, |ct| r.content_type == ct))
            .filter(|r| self.visible(r, &documents))
            .filter_map(|r| {
                let distance = self.metric.distance(query, &r.vector)?;
                (distance <= params.max_distance).then(|| SearchHit {
                    id: r.id.clone(),
                    content: r.content.clone(),
                    content_type: r.content_type,
                    metadata: r.metadata.clone(),
                    distance,
                    similarity: similarity_from_distance(distance),
                    created_at: format_ts_iso(r.created_at),
                    document_id: r.document_id.clone(),
                    chunk_index: r.chunk_index,
                })
            })
            .collect();

        rank_hits(&mut hits, params.limit);
        Ok(hits)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        let document = match self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            Some(d) => d.clone(),
            None => return Ok(None),
        };
        let chunks = self.document_chunks(id).await?;
        Ok(Some(DocumentResponse { document, chunks }))
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkResponse>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut chunks: Vec<ChunkResponse> = records
            .iter()
            .filter(|r| r.document_id.as_deref() == Some(document_id))
            .filter(|r| self.visible(r, &documents))
            .map(chunk_response)
            .collect();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn record(id: &str, vector: Vec<f32>, content_type: ContentType) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            content: format!("content of {id}"),
            content_hash: String::new(),
            vector,
            content_type,
            metadata: serde_json::json!({}),
            original_language: "en".to_string(),
            was_translated: false,
            document_id: None,
            chunk_index: None,
            chunk_total: None,
            model: "test".to_string(),
            created_at: 1_700_000_000,
        }
    }

    fn query(max_distance: f64) -> NearestQuery {
        NearestQuery {
            content_type: None,
            max_distance,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn test_nearest_inclusive_cutoff() {
        let store = InMemoryStore::default();
        store.insert_record(record("a", vec![0.0, 0.0], ContentType::Prompt)).unwrap();
        store.insert_record(record("b", vec![1.0, 0.0], ContentType::Prompt)).unwrap();
        store.insert_record(record("c", vec![3.0, 0.0], ContentType::Prompt)).unwrap();

        let hits = store.nearest(&[0.0, 0.0], &query(1.0)).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(hits[0].similarity, 1.0);
        assert_eq!(hits[1].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_content_type_filter() {
        let store = InMemoryStore::default();
        store.insert_record(record("p", vec![0.0, 0.1], ContentType::Prompt)).unwrap();
        store.insert_record(record("t", vec![0.0, 0.2], ContentType::Template)).unwrap();

        let mut params = query(5.0);
        params.content_type = Some(ContentType::Template);
        let hits = store.nearest(&[0.0, 0.0], &params).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "t");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryStore::default();
        store.insert_record(record("a", vec![0.0, 0.0], ContentType::Prompt)).unwrap();
        let err = store
            .insert_record(record("b", vec![0.0, 0.0, 0.0], ContentType::Prompt))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_chunks_hidden_until_document_total_matches() {
        let store = InMemoryStore::default();
        let mut chunk = record("c0", vec![0.0, 0.0], ContentType::Documentation);
        chunk.document_id = Some("doc".to_string());
        chunk.chunk_index = Some(0);
        chunk.chunk_total = Some(1);
        store.insert_record(chunk).unwrap();

        let mut doc = DocumentRecord {
            id: "doc".to_string(),
            title: "Guide".to_string(),
            doc_type: "guide".to_string(),
            component: None,
            project_id: None,
            original_language: "en".to_string(),
            total_chunks: 0,
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        };
        store.insert_document(doc.clone());
        assert!(store.nearest(&[0.0, 0.0], &query(1.0)).await.unwrap().is_empty());

        doc.total_chunks = 1;
        store.insert_document(doc);
        assert_eq!(store.nearest(&[0.0, 0.0], &query(1.0)).await.unwrap().len(), 1);
        let full = store.get_document("doc").await.unwrap().unwrap();
        assert_eq!(full.chunks.len(), 1);
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cosine_metric() {
        let store = InMemoryStore::new(DistanceMetric::Cosine);
        store.insert_record(record("same", vec![2.0, 0.0], ContentType::Prompt)).unwrap();
        store.insert_record(record("orth", vec![0.0, 1.0], ContentType::Prompt)).unwrap();
        let hits = store.nearest(&[1.0, 0.0], &query(0.5)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "same");
        assert!(hits[0].distance.abs() < 1e-6);
    }
}
