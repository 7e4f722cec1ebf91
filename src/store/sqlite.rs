//! SQLite-backed [`Store`] implementation, plus the row writers used by
//! the coordinator inside its transactions.
//!
//! Vectors are stored as little-endian f32 BLOBs and distances are computed
//! in Rust over every candidate row. Chunk rows only become visible once
//! their document row reports a matching `total_chunks`.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, DistanceMetric};
use crate::error::{Error, Result};
use crate::models::{
    format_ts_iso, similarity_from_distance, ContentType, DocumentRecord, DocumentationRecord,
    EmbeddingRecord, PromptRecord, SearchHit,
};

use super::{rank_hits, ChunkResponse, DocumentResponse, NearestQuery, Store};

const DIMS_KEY: &str = "dims";

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    metric: DistanceMetric,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, metric: DistanceMetric) -> Self {
        Self { pool, metric }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_metadata(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::json!({}))
}

fn chunk_from_row(row: &SqliteRow) -> ChunkResponse {
    let created_at: i64 = row.get("created_at");
    let metadata_json: String = row.get("metadata_json");
    ChunkResponse {
        id: row.get("id"),
        index: row.get("chunk_index"),
        total: row.get("chunk_total"),
        content: row.get("content"),
        original_language: row.get("original_language"),
        was_translated: row.get("was_translated"),
        metadata: parse_metadata(&metadata_json),
        created_at: format_ts_iso(created_at),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn nearest(&self, query: &[f32], params: &NearestQuery) -> Result<Vec<SearchHit>> {
        let content_type = params.content_type.map(|ct| ct.as_str());
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.content, e.content_type, e.metadata_json, e.embedding,
                   e.created_at, e.document_id, e.chunk_index
            FROM embeddings e
            LEFT JOIN documents d ON d.id = e.document_id
            WHERE (e.document_id IS NULL OR d.total_chunks = e.chunk_total)
              AND (? IS NULL OR e.content_type = ?)
            "#,
        )
        .bind(content_type)
        .bind(content_type)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        let mut skipped = 0usize;
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let distance = match self.metric.distance(query, &vector) {
                Some(d) => d,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            if distance > params.max_distance {
                continue;
            }
            let content_type: String = row.get("content_type");
            let metadata_json: String = row.get("metadata_json");
            let created_at: i64 = row.get("created_at");
            hits.push(SearchHit {
                id: row.get("id"),
                content: row.get("content"),
                content_type: content_type.parse::<ContentType>()?,
                metadata: parse_metadata(&metadata_json),
                distance,
                similarity: similarity_from_distance(distance),
                created_at: format_ts_iso(created_at),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
            });
        }
        if skipped > 0 {
            tracing::warn!(
                target: "store",
                "{} stored vectors skipped: dimensionality differs from the query",
                skipped
            );
        }

        rank_hits(&mut hits, params.limit);
        Ok(hits)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, doc_type, component, project_id, original_language,
                   total_chunks, metadata_json, created_at, updated_at
            FROM documents WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let metadata_json: String = row.get("metadata_json");
        let document = DocumentRecord {
            id: row.get("id"),
            title: row.get("title"),
            doc_type: row.get("doc_type"),
            component: row.get("component"),
            project_id: row.get("project_id"),
            original_language: row.get("original_language"),
            total_chunks: row.get("total_chunks"),
            metadata: parse_metadata(&metadata_json),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        };
        let chunks = self.document_chunks(id).await?;
        Ok(Some(DocumentResponse { document, chunks }))
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkResponse>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.chunk_index, e.chunk_total, e.content, e.original_language,
                   e.was_translated, e.metadata_json, e.created_at
            FROM embeddings e
            JOIN documents d ON d.id = e.document_id
            WHERE e.document_id = ? AND d.total_chunks = e.chunk_total
            ORDER BY e.chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }
}

// ============ Row writers (called inside coordinator transactions) ============

/// Check `dims` against the store's recorded dimensionality, recording it
/// on first use.
///
/// Must be the first statement of a transaction: it writes first so the
/// write lock is taken before any read snapshot.
pub(crate) async fn ensure_dims(conn: &mut SqliteConnection, dims: usize) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO store_meta (key, value) VALUES (?, ?)")
        .bind(DIMS_KEY)
        .bind(dims.to_string())
        .execute(&mut *conn)
        .await?;

    let stored: String = sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
        .bind(DIMS_KEY)
        .fetch_one(&mut *conn)
        .await?;

    match stored.parse::<usize>() {
        Ok(existing) if existing == dims => Ok(()),
        Ok(existing) => Err(Error::validation(format!(
            "embedding has {} dimensions, store holds {}",
            dims, existing
        ))),
        Err(_) => Err(Error::validation(format!(
            "store metadata holds an invalid dimension value: {}",
            stored
        ))),
    }
}

pub(crate) async fn insert_embedding(
    conn: &mut SqliteConnection,
    record: &EmbeddingRecord,
) -> Result<()> {
    let metadata_json = serde_json::to_string(&record.metadata)?;
    sqlx::query(
        r#"
        INSERT INTO embeddings (id, content, content_hash, embedding, dims, model,
                                content_type, metadata_json, original_language,
                                was_translated, document_id, chunk_index, chunk_total,
                                created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.content)
    .bind(&record.content_hash)
    .bind(vec_to_blob(&record.vector))
    .bind(record.vector.len() as i64)
    .bind(&record.model)
    .bind(record.content_type.as_str())
    .bind(metadata_json)
    .bind(&record.original_language)
    .bind(record.was_translated)
    .bind(&record.document_id)
    .bind(record.chunk_index)
    .bind(record.chunk_total)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_prompt(conn: &mut SqliteConnection, prompt: &PromptRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO prompts (id, embedding_id, session_id, project_id, original_text,
                             language, response_summary, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&prompt.id)
    .bind(&prompt.embedding_id)
    .bind(&prompt.session_id)
    .bind(&prompt.project_id)
    .bind(&prompt.original_text)
    .bind(&prompt.language)
    .bind(&prompt.response_summary)
    .bind(prompt.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_documentation(
    conn: &mut SqliteConnection,
    doc: &DocumentationRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documentation (id, embedding_id, title, component, original_text,
                                   language, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.embedding_id)
    .bind(&doc.title)
    .bind(&doc.component)
    .bind(&doc.original_text)
    .bind(&doc.language)
    .bind(doc.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_document(conn: &mut SqliteConnection, doc: &DocumentRecord) -> Result<()> {
    let metadata_json = serde_json::to_string(&doc.metadata)?;
    sqlx::query(
        r#"
        INSERT INTO documents (id, title, doc_type, component, project_id,
                               original_language, total_chunks, metadata_json,
                               created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.title)
    .bind(&doc.doc_type)
    .bind(&doc.component)
    .bind(&doc.project_id)
    .bind(&doc.original_language)
    .bind(doc.total_chunks)
    .bind(metadata_json)
    .bind(doc.created_at)
    .bind(doc.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn set_total_chunks(
    conn: &mut SqliteConnection,
    document_id: &str,
    total_chunks: i64,
    updated_at: i64,
) -> Result<()> {
    sqlx::query("UPDATE documents SET total_chunks = ?, updated_at = ? WHERE id = ?")
        .bind(total_chunks)
        .bind(updated_at)
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
