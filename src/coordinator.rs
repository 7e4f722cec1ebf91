//! Transactional units of work over the SQLite store.
//!
//! | Operation | Rows written in one transaction |
//! |-----------|--------------------------------|
//! | [`Coordinator::save_single`] | one embedding |
//! | [`Coordinator::save_unit_with_owner`] | one embedding + one prompt or documentation row |
//! | [`Coordinator::ingest_document`] | one document + all its chunk embeddings |
//!
//! Every external call (translation, embedding) completes before the
//! transaction opens, so the SQLite write lock is held only while rows are
//! inserted. Any failure rolls the whole unit back; readers never observe
//! a document with a partial chunk set.
//!
//! # Document ingestion
//!
//! 1. Split the text into word windows.
//! 2. Prepare every chunk concurrently on a `JoinSet` bounded by a
//!    `Semaphore`: translate, clean, embed.
//! 3. On the first failed chunk, abort the remaining tasks and return.
//! 4. Open a transaction: insert the document row with `total_chunks = 0`,
//!    insert every chunk row, set `total_chunks`, commit.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunk::{self, ChunkParams};
use crate::config::{Config, LimitsConfig};
use crate::embedding::{clean_text, EmbeddingGenerator};
use crate::error::{Error, Result};
use crate::models::{
    ContentType, DocumentMeta, DocumentRecord, DocumentationRecord, EmbeddingRecord,
    IngestedDocument, Owner, PromptRecord, SavedUnit,
};
use crate::store::sqlite::{self as rows, SqliteStore};
use crate::store::{ChunkResponse, DocumentResponse, Store};
use crate::translate::{language_label, TranslationResult, Translator};

/// A translated and embedded piece of text, ready to be written.
#[derive(Debug, Clone)]
struct Prepared {
    content: String,
    vector: Vec<f32>,
    translation: TranslationResult,
}

async fn prepare(
    translator: &dyn Translator,
    generator: &EmbeddingGenerator,
    text: &str,
    language: Option<&str>,
) -> Result<Prepared> {
    let translation = translator.translate(text, language).await.into_result();
    let content = clean_text(&translation.translated_text, generator.max_input_chars());
    if content.is_empty() {
        return Err(Error::validation("content is empty after cleaning"));
    }
    let vector = generator.embed(&content).await?;
    Ok(Prepared {
        content,
        vector,
        translation,
    })
}

/// Caller metadata as an object, with translation provenance added under
/// the `translation` key.
fn with_provenance(
    metadata: &serde_json::Value,
    translation: &TranslationResult,
) -> Result<serde_json::Value> {
    let mut map = match metadata {
        serde_json::Value::Null => serde_json::Map::new(),
        serde_json::Value::Object(map) => map.clone(),
        _ => return Err(Error::validation("metadata must be a JSON object")),
    };
    map.insert("translation".to_string(), translation.provenance());
    Ok(serde_json::Value::Object(map))
}

fn check_metadata(metadata: &serde_json::Value) -> Result<()> {
    match metadata {
        serde_json::Value::Null | serde_json::Value::Object(_) => Ok(()),
        _ => Err(Error::validation("metadata must be a JSON object")),
    }
}

fn check_length(text: &str, max_chars: usize, what: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", what)));
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(Error::validation(format!(
            "{} is {} characters, limit is {}",
            what, len, max_chars
        )));
    }
    Ok(())
}

/// Owns the write path: translation, embedding, and the SQLite
/// transactions that persist the results.
pub struct Coordinator {
    store: SqliteStore,
    generator: EmbeddingGenerator,
    translator: Arc<dyn Translator>,
    chunking: ChunkParams,
    limits: LimitsConfig,
    max_concurrency: usize,
}

impl Coordinator {
    pub fn new(
        pool: SqlitePool,
        generator: EmbeddingGenerator,
        translator: Arc<dyn Translator>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            store: SqliteStore::new(pool, config.retrieval.metric),
            generator,
            translator,
            chunking: ChunkParams::from_config(&config.chunking)?,
            limits: config.limits.clone(),
            max_concurrency: config.ingest.max_concurrency.max(1),
        })
    }

    /// Read-side view over the same pool.
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    fn embedding_record(
        &self,
        prepared: &Prepared,
        content_type: ContentType,
        metadata: serde_json::Value,
        now: i64,
    ) -> EmbeddingRecord {
        EmbeddingRecord {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: chunk::content_hash(&prepared.content),
            content: prepared.content.clone(),
            vector: prepared.vector.clone(),
            content_type,
            metadata,
            original_language: prepared.translation.detected_language.clone(),
            was_translated: prepared.translation.was_translated,
            document_id: None,
            chunk_index: None,
            chunk_total: None,
            model: self.generator.model_name().to_string(),
            created_at: now,
        }
    }

    /// Translate, embed, and store one piece of content. Returns the new
    /// embedding id.
    pub async fn save_single(
        &self,
        content: &str,
        content_type: ContentType,
        metadata: serde_json::Value,
        language: Option<&str>,
    ) -> Result<String> {
        check_length(content, self.limits.max_content_chars, "content")?;
        check_metadata(&metadata)?;

        let prepared = prepare(self.translator.as_ref(), &self.generator, content, language).await?;
        let now = chrono::Utc::now().timestamp();
        let record = self.embedding_record(
            &prepared,
            content_type,
            with_provenance(&metadata, &prepared.translation)?,
            now,
        );

        let mut tx = self.pool().begin().await?;
        rows::ensure_dims(&mut *tx, record.vector.len()).await?;
        rows::insert_embedding(&mut *tx, &record).await?;
        tx.commit().await?;

        tracing::info!(
            target: "ingest",
            "saved {} {} (translated: {})",
            content_type,
            record.id,
            record.was_translated
        );
        Ok(record.id)
    }

    /// Store one embedding together with the record that owns it. Both rows
    /// commit or neither does.
    pub async fn save_unit_with_owner(
        &self,
        content: &str,
        owner: Owner,
        language: Option<&str>,
    ) -> Result<SavedUnit> {
        check_length(content, self.limits.max_content_chars, "content")?;
        if let Owner::Prompt {
            session_id,
            project_id,
            ..
        } = &owner
        {
            if session_id.trim().is_empty() || project_id.trim().is_empty() {
                return Err(Error::validation(
                    "prompt owner needs a session_id and a project_id",
                ));
            }
        }
        if let Owner::Documentation { title, .. } = &owner {
            if title.trim().is_empty() {
                return Err(Error::validation("documentation owner needs a title"));
            }
        }

        let prepared = prepare(self.translator.as_ref(), &self.generator, content, language).await?;
        let now = chrono::Utc::now().timestamp();
        let content_type = owner.content_type();
        let record = self.embedding_record(
            &prepared,
            content_type,
            with_provenance(&serde_json::Value::Null, &prepared.translation)?,
            now,
        );
        let owner_id = uuid::Uuid::new_v4().to_string();
        let language = if prepared.translation.was_translated {
            prepared.translation.detected_language.clone()
        } else {
            language_label(language)
        };

        let mut tx = self.pool().begin().await?;
        rows::ensure_dims(&mut *tx, record.vector.len()).await?;
        rows::insert_embedding(&mut *tx, &record).await?;
        match owner {
            Owner::Prompt {
                session_id,
                project_id,
                response_summary,
            } => {
                let prompt = PromptRecord {
                    id: owner_id.clone(),
                    embedding_id: record.id.clone(),
                    session_id,
                    project_id,
                    original_text: content.to_string(),
                    language,
                    response_summary,
                    created_at: now,
                };
                rows::insert_prompt(&mut *tx, &prompt).await?;
            }
            Owner::Documentation { title, component } => {
                let doc = DocumentationRecord {
                    id: owner_id.clone(),
                    embedding_id: record.id.clone(),
                    title,
                    component,
                    original_text: content.to_string(),
                    language,
                    created_at: now,
                };
                rows::insert_documentation(&mut *tx, &doc).await?;
            }
        }
        tx.commit().await?;

        tracing::info!(
            target: "ingest",
            "saved {} {} with owner {}",
            content_type,
            record.id,
            owner_id
        );
        Ok(SavedUnit {
            embedding_id: record.id,
            owner_id,
        })
    }

    /// Chunk, translate, embed, and store a long document as one unit.
    ///
    /// Either every chunk and the document's final `total_chunks` are
    /// committed, or nothing is.
    pub async fn ingest_document(
        &self,
        full_text: &str,
        meta: DocumentMeta,
        language: Option<&str>,
    ) -> Result<IngestedDocument> {
        check_length(full_text, self.limits.max_document_chars, "document")?;
        if meta.title.trim().is_empty() {
            return Err(Error::validation("document title must not be empty"));
        }
        check_metadata(&meta.metadata)?;

        let chunks: Vec<String> = chunk::split_iter(full_text, self.chunking).collect();
        let total = chunks.len();
        tracing::info!(
            target: "ingest",
            "document '{}': {} chunks ({} words per chunk, {} overlap)",
            meta.title,
            total,
            self.chunking.max_words(),
            self.chunking.overlap_words()
        );

        let prepared = self.prepare_chunks(chunks, language).await?;

        let now = chrono::Utc::now().timestamp();
        let document_id = uuid::Uuid::new_v4().to_string();
        let original_language = match language {
            Some(l) if !l.trim().is_empty() && !l.trim().eq_ignore_ascii_case("auto") => {
                language_label(Some(l))
            }
            _ => prepared
                .first()
                .map(|p| p.translation.detected_language.clone())
                .unwrap_or_else(|| language_label(None)),
        };
        let document = DocumentRecord {
            id: document_id.clone(),
            title: meta.title.clone(),
            doc_type: meta.doc_type.clone(),
            component: meta.component.clone(),
            project_id: meta.project_id.clone(),
            original_language,
            total_chunks: 0,
            metadata: match &meta.metadata {
                serde_json::Value::Null => serde_json::json!({}),
                other => other.clone(),
            },
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;
        if let Some(first) = prepared.first() {
            rows::ensure_dims(&mut *tx, first.vector.len()).await?;
        }
        rows::insert_document(&mut *tx, &document).await?;
        for (index, chunk) in prepared.iter().enumerate() {
            let mut metadata = with_provenance(&meta.metadata, &chunk.translation)?;
            if let serde_json::Value::Object(map) = &mut metadata {
                map.insert("title".to_string(), serde_json::json!(meta.title));
            }
            let mut record = self.embedding_record(chunk, meta.content_type, metadata, now);
            record.document_id = Some(document_id.clone());
            record.chunk_index = Some(index as i64);
            record.chunk_total = Some(total as i64);
            rows::insert_embedding(&mut *tx, &record).await?;
        }
        rows::set_total_chunks(&mut *tx, &document_id, total as i64, now).await?;
        tx.commit().await?;

        tracing::info!(
            target: "ingest",
            "document {} stored with {} chunks",
            document_id,
            total
        );
        Ok(IngestedDocument {
            document_id,
            total_chunks: total as i64,
        })
    }

    /// Translate and embed chunks concurrently. Results come back in chunk
    /// order; the first failure aborts the rest.
    async fn prepare_chunks(
        &self,
        chunks: Vec<String>,
        language: Option<&str>,
    ) -> Result<Vec<Prepared>> {
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, text) in chunks.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let translator = self.translator.clone();
            let generator = self.generator.clone();
            let language = language.map(str::to_string);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let prepared =
                    prepare(translator.as_ref(), &generator, &text, language.as_deref()).await?;
                Ok::<_, Error>((index, prepared))
            });
        }

        let mut slots: Vec<Option<Prepared>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(Error::from).and_then(|r| r) {
                Ok((index, prepared)) => {
                    tracing::debug!(target: "ingest", "chunk {}/{} prepared", index + 1, total);
                    slots[index] = Some(prepared);
                }
                Err(e) => {
                    tasks.abort_all();
                    tracing::warn!(target: "ingest", "chunk preparation failed: {}", e);
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    Error::embedding(format!("chunk {} produced no embedding", index))
                })
            })
            .collect()
    }

    /// Chunks of a committed document, ordered by index.
    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkResponse>> {
        self.store.document_chunks(document_id).await
    }

    /// Document row plus chunks; [`Error::NotFound`] for unknown ids.
    pub async fn get_document(&self, document_id: &str) -> Result<DocumentResponse> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))
    }
}
