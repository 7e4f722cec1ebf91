//! Database statistics overview.
//!
//! Summarizes what's indexed: records per content type, documents,
//! prompts, and how much was translated. Used by `cv stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::ContentType;

#[derive(Debug, Clone, Serialize)]
pub struct TypeStats {
    pub content_type: String,
    pub records: i64,
    pub translated: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultStats {
    pub records: i64,
    pub translated: i64,
    pub documents: i64,
    pub prompts: i64,
    pub documentation: i64,
    pub dims: Option<i64>,
    pub last_write: Option<i64>,
    pub by_type: Vec<TypeStats>,
}

/// Gather counts from an open pool.
pub async fn collect_stats(pool: &SqlitePool) -> Result<VaultStats> {
    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
        .fetch_one(pool)
        .await?;
    let translated: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE was_translated = 1")
            .fetch_one(pool)
            .await?;
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let prompts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prompts")
        .fetch_one(pool)
        .await?;
    let documentation: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documentation")
        .fetch_one(pool)
        .await?;
    let last_write: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM embeddings")
        .fetch_one(pool)
        .await?;
    let dims: Option<String> =
        sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dims'")
            .fetch_optional(pool)
            .await?;

    let rows = sqlx::query(
        r#"
        SELECT content_type,
               COUNT(*) AS records,
               COALESCE(SUM(was_translated), 0) AS translated
        FROM embeddings
        GROUP BY content_type
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_type = ContentType::ALL
        .iter()
        .map(|ct| {
            let row = rows
                .iter()
                .find(|r| r.get::<String, _>("content_type") == ct.as_str());
            TypeStats {
                content_type: ct.as_str().to_string(),
                records: row.map(|r| r.get::<i64, _>("records")).unwrap_or(0),
                translated: row.map(|r| r.get::<i64, _>("translated")).unwrap_or(0),
            }
        })
        .collect();

    Ok(VaultStats {
        records,
        translated,
        documents,
        prompts,
        documentation,
        dims: dims.and_then(|d| d.parse().ok()),
        last_write,
        by_type,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Context Vault: Database Stats");
    println!("==============================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    if let Some(dims) = stats.dims {
        println!("  Dimensions:    {}", dims);
    }
    println!(
        "  Last write:    {}",
        stats
            .last_write
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Records:       {}", stats.records);
    println!(
        "  Translated:    {} / {} ({}%)",
        stats.translated,
        stats.records,
        if stats.records > 0 {
            (stats.translated * 100) / stats.records
        } else {
            0
        }
    );
    println!("  Documents:     {}", stats.documents);
    println!("  Prompts:       {}", stats.prompts);
    println!("  Doc snippets:  {}", stats.documentation);
    println!();
    println!("  {:<16} {:>8} {:>11}", "CONTENT TYPE", "RECORDS", "TRANSLATED");
    println!("  {}", "-".repeat(37));
    for t in &stats.by_type {
        println!("  {:<16} {:>8} {:>11}", t.content_type, t.records, t.translated);
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now ("3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return crate::models::format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        crate::models::format_ts_iso(ts)
    }
}
