//! Idempotent schema setup.
//!
//! Every statement uses `IF NOT EXISTS`, so running migrations on an
//! existing database is a no-op.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        component TEXT,
        project_id TEXT,
        original_language TEXT NOT NULL,
        total_chunks INTEGER NOT NULL DEFAULT 0,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        embedding BLOB NOT NULL,
        dims INTEGER NOT NULL,
        model TEXT NOT NULL,
        content_type TEXT NOT NULL
            CHECK (content_type IN ('prompt', 'source_code', 'template', 'documentation')),
        metadata_json TEXT NOT NULL DEFAULT '{}',
        original_language TEXT NOT NULL,
        was_translated INTEGER NOT NULL DEFAULT 0,
        document_id TEXT,
        chunk_index INTEGER,
        chunk_total INTEGER,
        created_at INTEGER NOT NULL,
        UNIQUE(document_id, chunk_index),
        FOREIGN KEY (document_id) REFERENCES documents(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS prompts (
        id TEXT PRIMARY KEY,
        embedding_id TEXT NOT NULL UNIQUE,
        session_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        original_text TEXT NOT NULL,
        language TEXT NOT NULL,
        response_summary TEXT,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (embedding_id) REFERENCES embeddings(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documentation (
        id TEXT PRIMARY KEY,
        embedding_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        component TEXT,
        original_text TEXT NOT NULL,
        language TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (embedding_id) REFERENCES embeddings(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_embeddings_content_type ON embeddings(content_type)",
    "CREATE INDEX IF NOT EXISTS idx_embeddings_document_id ON embeddings(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_prompts_session ON prompts(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_prompts_project ON prompts(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id)",
];

/// Apply the schema on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Open the configured database, apply the schema, and close the pool.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}
