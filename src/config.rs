//! TOML configuration parsing and validation.
//!
//! All tunables of the pipeline (chunk sizes, thresholds, provider choice,
//! limits) live here so they can be changed without code changes.
//!
//! ```toml
//! [db]
//! path = "./data/vault.sqlite"
//!
//! [chunking]
//! max_words = 50
//! overlap_words = 25
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [translation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [retrieval]
//! progressive_thresholds = [1.0, 1.5, 2.0, 2.5]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::embedding::DistanceMetric;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Word-based chunking parameters. `overlap_words` must stay below `max_words`.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_max_words() -> usize {
    50
}
fn default_overlap_words() -> usize {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama, OpenAI-compatible gateways).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Cleaned text is capped to this many characters before the model call.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_translation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            timeout_secs: default_translation_timeout_secs(),
            temperature: 0.0,
        }
    }
}

fn default_translation_timeout_secs() -> u64 {
    60
}

/// Search policy defaults. Every value can also be overridden per call.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Primary cutoff for fixed-threshold search.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Secondary ceiling for fixed-threshold search.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    #[serde(default = "default_progressive_thresholds")]
    pub progressive_thresholds: Vec<f64>,
    /// Ceiling applied on top of every progressive attempt.
    #[serde(default = "default_progressive_max_distance")]
    pub progressive_max_distance: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::default(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            threshold: default_threshold(),
            max_distance: default_max_distance(),
            progressive_thresholds: default_progressive_thresholds(),
            progressive_max_distance: default_progressive_max_distance(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    100
}
fn default_threshold() -> f64 {
    1.5
}
fn default_max_distance() -> f64 {
    2.0
}
fn default_progressive_thresholds() -> Vec<f64> {
    vec![1.0, 1.5, 2.0, 2.5]
}
fn default_progressive_max_distance() -> f64 {
    2.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Upper bound for single snippets (prompts, code, templates).
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Upper bound for a full document passed to `ingest_document`.
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
            max_document_chars: default_max_document_chars(),
        }
    }
}

fn default_max_content_chars() -> usize {
    32_000
}
fn default_max_document_chars() -> usize {
    1_000_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Chunks prepared (translated + embedded) in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

/// Log levels: a default plus per-target overrides (`ingest`, `search`, ...).
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_words == 0 {
            bail!("chunking.max_words must be > 0");
        }
        if self.chunking.overlap_words >= self.chunking.max_words {
            bail!(
                "chunking.overlap_words ({}) must be smaller than chunking.max_words ({})",
                self.chunking.overlap_words,
                self.chunking.max_words
            );
        }

        if self.retrieval.default_limit == 0 || self.retrieval.max_limit == 0 {
            bail!("retrieval.default_limit and retrieval.max_limit must be >= 1");
        }
        if self.retrieval.default_limit > self.retrieval.max_limit {
            bail!("retrieval.default_limit must not exceed retrieval.max_limit");
        }
        for (name, value) in [
            ("retrieval.threshold", self.retrieval.threshold),
            ("retrieval.max_distance", self.retrieval.max_distance),
            (
                "retrieval.progressive_max_distance",
                self.retrieval.progressive_max_distance,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a finite, non-negative number", name);
            }
        }
        if self.retrieval.progressive_thresholds.is_empty() {
            bail!("retrieval.progressive_thresholds must not be empty");
        }
        if self
            .retrieval
            .progressive_thresholds
            .windows(2)
            .any(|w| w[0] >= w[1])
        {
            bail!("retrieval.progressive_thresholds must be strictly ascending");
        }

        if self.limits.max_content_chars == 0 || self.limits.max_document_chars == 0 {
            bail!("limits.max_content_chars and limits.max_document_chars must be > 0");
        }
        if self.embedding.max_input_chars == 0 {
            bail!("embedding.max_input_chars must be > 0");
        }
        if self.ingest.max_concurrency == 0 {
            bail!("ingest.max_concurrency must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        match self.translation.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if self.translation.model.is_none() {
                    bail!(
                        "translation.model must be specified when provider is '{}'",
                        self.translation.provider
                    );
                }
            }
            other => bail!(
                "Unknown translation provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}
