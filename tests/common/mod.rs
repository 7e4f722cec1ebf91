//! Shared fixtures: a temp SQLite database plus deterministic embedder and
//! translator doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use context_vault::config::Config;
use context_vault::coordinator::Coordinator;
use context_vault::embedding::{Embedder, EmbeddingGenerator};
use context_vault::error::{Error, Result};
use context_vault::translate::{language_label, TranslationOutcome, TranslationResult, Translator};
use context_vault::{db, migrate};

/// Maps text to a vector by the first matching keyword; everything else
/// lands on the origin. Text containing `FAIL` makes the call fail.
pub struct TableEmbedder {
    pub dims: usize,
    pub table: Vec<(&'static str, Vec<f32>)>,
    pub calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new(table: Vec<(&'static str, Vec<f32>)>) -> Arc<Self> {
        Arc::new(Self {
            dims: 3,
            table,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_dims(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            dims,
            table: Vec::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn model_name(&self) -> &str {
        "table-test"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts
            .iter()
            .map(|text| {
                if text.contains("FAIL") {
                    return Err(Error::embedding("forced failure"));
                }
                let vector = self
                    .table
                    .iter()
                    .find(|(key, _)| text.contains(key))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0; self.dims]);
                Ok(vector)
            })
            .collect()
    }
}

/// Sleeps inside every call and records the highest number of calls in
/// flight at once.
pub struct InFlightEmbedder {
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl InFlightEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for InFlightEmbedder {
    fn model_name(&self) -> &str {
        "in-flight-test"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

/// A translator whose backend is always down.
pub struct UnavailableTranslator {
    pub calls: AtomicUsize,
}

impl UnavailableTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for UnavailableTranslator {
    async fn translate(&self, text: &str, _source_language: Option<&str>) -> TranslationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TranslationOutcome::Fallback {
            text: text.to_string(),
            reason: "translation backend unavailable".to_string(),
        }
    }
}

/// "Translates" Spanish by swapping a few words; any other language passes
/// through untouched.
pub struct GlossaryTranslator {
    pub calls: AtomicUsize,
}

impl GlossaryTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for GlossaryTranslator {
    async fn translate(&self, text: &str, source_language: Option<&str>) -> TranslationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if source_language != Some("es") {
            return TranslationOutcome::Passthrough {
                text: text.to_string(),
                language: language_label(source_language),
            };
        }
        let translated = text
            .split_whitespace()
            .map(|w| match w {
                "hola" => "hello",
                "pedido" => "order",
                "error" => "error",
                "el" => "the",
                other => other,
            })
            .collect::<Vec<_>>()
            .join(" ");
        TranslationOutcome::Translated(TranslationResult {
            original_text: text.to_string(),
            translated_text: translated,
            was_translated: true,
            detected_language: "es".to_string(),
            technical_terms: context_vault::translate::extract_technical_terms(text),
        })
    }
}

pub struct Fixture {
    pub _dir: TempDir,
    pub config: Config,
    pub pool: sqlx::SqlitePool,
}

pub async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let config = Config::from_toml_str(&format!(
        "[db]\npath = \"{}\"\n[ingest]\nmax_concurrency = 3\n",
        dir.path().join("vault.sqlite").display()
    ))
    .unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate(&pool).await.unwrap();
    Fixture {
        _dir: dir,
        config,
        pool,
    }
}

pub fn generator(embedder: Arc<TableEmbedder>) -> EmbeddingGenerator {
    EmbeddingGenerator::new(embedder, 8000)
}

pub fn coordinator(
    fx: &Fixture,
    embedder: Arc<TableEmbedder>,
    translator: Arc<dyn Translator>,
) -> Coordinator {
    Coordinator::new(fx.pool.clone(), generator(embedder), translator, &fx.config).unwrap()
}

pub fn coordinator_with(
    fx: &Fixture,
    embedder: Arc<dyn Embedder>,
    translator: Arc<dyn Translator>,
) -> Coordinator {
    Coordinator::new(
        fx.pool.clone(),
        EmbeddingGenerator::new(embedder, 8000),
        translator,
        &fx.config,
    )
    .unwrap()
}

pub async fn count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// `w0 w1 ... w{n-1}`, with `FAIL` substituted at `fail_at`.
pub fn words(n: usize, fail_at: Option<usize>) -> String {
    (0..n)
        .map(|i| {
            if Some(i) == fail_at {
                "FAIL".to_string()
            } else {
                format!("w{}", i)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
