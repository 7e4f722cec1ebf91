//! Document retrieval by ID.
//!
//! Fetches a document and its chunks in index order. Used by the
//! `cv chunks` command.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::models::format_ts_iso;
use crate::store::{DocumentResponse, SqliteStore, Store};

/// Core get function returning structured data.
pub async fn get_document(config: &Config, id: &str) -> Result<DocumentResponse> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.retrieval.metric);
    let doc = store.get_document(id).await;
    pool.close().await;

    match doc? {
        Some(doc) => Ok(doc),
        None => Err(crate::error::Error::NotFound(format!("document {}", id)).into()),
    }
}

/// CLI entry point: print the document and its chunks to stdout.
pub async fn run_chunks(config: &Config, id: &str, json: bool) -> Result<()> {
    let doc = get_document(config, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let d = &doc.document;
    println!("--- Document ---");
    println!("id:           {}", d.id);
    println!("title:        {}", d.title);
    println!("doc_type:     {}", d.doc_type);
    if let Some(ref component) = d.component {
        println!("component:    {}", component);
    }
    if let Some(ref project) = d.project_id {
        println!("project_id:   {}", project);
    }
    println!("language:     {}", d.original_language);
    println!("created_at:   {}", format_ts_iso(d.created_at));
    println!("updated_at:   {}", format_ts_iso(d.updated_at));
    println!("metadata:     {}", d.metadata);
    println!();

    println!("--- Chunks ({}/{}) ---", doc.chunks.len(), d.total_chunks);
    for chunk in &doc.chunks {
        let marker = if chunk.was_translated {
            format!(" (translated from {})", chunk.original_language)
        } else {
            String::new()
        };
        println!("[chunk {}]{}", chunk.index, marker);
        println!("{}", chunk.content);
        println!();
    }

    Ok(())
}
