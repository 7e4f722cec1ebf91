//! # Context Vault CLI (`cv`)
//!
//! The `cv` binary drives the ingestion and search core from a shell.
//!
//! ## Usage
//!
//! ```bash
//! cv --config ./config/cv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cv init` | Create the SQLite database and run schema migrations |
//! | `cv save "<text>"` | Store one snippet (prompt, source_code, template, documentation) |
//! | `cv prompt "<text>"` | Store a user prompt with its session and project |
//! | `cv doc "<text>"` | Store a titled documentation snippet |
//! | `cv ingest <file>` | Chunk, embed, and store a long document |
//! | `cv chunks <id>` | Show a document and its chunks |
//! | `cv search "<query>"` | Fixed or progressive similarity search |
//! | `cv stats` | Summary of what's indexed |
//!
//! ## Examples
//!
//! ```bash
//! cv init
//! cv prompt "¿Cómo calculo ORDER_TOTAL?" --session s1 --project shop --language es
//! cv ingest ./docs/billing.md --title "Billing guide" --doc-type guide
//! cv search "order total rounding" --progressive --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use context_vault::config::{self, Config};
use context_vault::coordinator::Coordinator;
use context_vault::embedding::{create_embedder, EmbeddingGenerator};
use context_vault::models::{ContentType, DocumentMeta, Owner};
use context_vault::search::{SearchEngine, SearchRequest, ThresholdPolicy};
use context_vault::store::SqliteStore;
use context_vault::translate::create_translator;
use context_vault::{db, get, logging, migrate, stats};

/// Context Vault CLI: multilingual ingestion and vector search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "cv",
    about = "Context Vault: multilingual ingestion and vector search over SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Store a single snippet.
    Save {
        /// Text to store.
        content: String,

        /// Content type: prompt, source_code, template, documentation.
        #[arg(long = "type", default_value = "source_code")]
        content_type: String,

        /// Extra metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,

        /// Language of the text (`en`, `es`, ... or `auto`).
        #[arg(long)]
        language: Option<String>,
    },

    /// Store a user prompt.
    Prompt {
        content: String,

        #[arg(long)]
        session: String,

        #[arg(long)]
        project: String,

        /// Short summary of the response the prompt received.
        #[arg(long)]
        summary: Option<String>,

        #[arg(long)]
        language: Option<String>,
    },

    /// Store a documentation snippet.
    Doc {
        content: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        component: Option<String>,

        #[arg(long)]
        language: Option<String>,
    },

    /// Chunk and store a long document from a file.
    Ingest {
        file: PathBuf,

        /// Defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        #[arg(long, default_value = "document")]
        doc_type: String,

        #[arg(long)]
        component: Option<String>,

        #[arg(long)]
        project: Option<String>,

        /// Content type stamped on every chunk.
        #[arg(long = "type", default_value = "documentation")]
        content_type: String,

        #[arg(long)]
        language: Option<String>,
    },

    /// Show a document and its chunks.
    Chunks {
        document_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Search stored records.
    Search {
        query: String,

        /// Restrict to one content type.
        #[arg(long = "type")]
        content_type: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        language: Option<String>,

        /// Widen the threshold step by step until something matches.
        #[arg(long)]
        progressive: bool,

        /// Fixed-mode threshold (defaults to `retrieval.threshold`).
        #[arg(long, conflicts_with = "progressive")]
        threshold: Option<f64>,

        /// Distance ceiling (defaults to the configured ceiling for the mode).
        #[arg(long)]
        max_distance: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

struct Runtime {
    coordinator: Coordinator,
    generator: EmbeddingGenerator,
    translator: Arc<dyn context_vault::translate::Translator>,
}

async fn open(cfg: &Config) -> Result<Runtime> {
    let pool = db::connect(cfg).await?;
    migrate::migrate(&pool).await?;
    let generator = EmbeddingGenerator::new(
        create_embedder(&cfg.embedding)?,
        cfg.embedding.max_input_chars,
    );
    let translator = create_translator(&cfg.translation)?;
    let coordinator = Coordinator::new(pool, generator.clone(), translator.clone(), cfg)?;
    Ok(Runtime {
        coordinator,
        generator,
        translator,
    })
}

fn parse_metadata(raw: Option<&str>) -> Result<serde_json::Value> {
    match raw {
        None => Ok(serde_json::json!({})),
        Some(s) => serde_json::from_str(s).context("--metadata must be valid JSON"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Save {
            content,
            content_type,
            metadata,
            language,
        } => {
            let content_type: ContentType = content_type.parse()?;
            let metadata = parse_metadata(metadata.as_deref())?;
            let rt = open(&cfg).await?;
            let id = rt
                .coordinator
                .save_single(&content, content_type, metadata, language.as_deref())
                .await?;
            println!("{}", id);
        }
        Commands::Prompt {
            content,
            session,
            project,
            summary,
            language,
        } => {
            let rt = open(&cfg).await?;
            let owner = Owner::Prompt {
                session_id: session,
                project_id: project,
                response_summary: summary,
            };
            let saved = rt
                .coordinator
                .save_unit_with_owner(&content, owner, language.as_deref())
                .await?;
            println!("{}", serde_json::to_string(&saved)?);
        }
        Commands::Doc {
            content,
            title,
            component,
            language,
        } => {
            let rt = open(&cfg).await?;
            let owner = Owner::Documentation { title, component };
            let saved = rt
                .coordinator
                .save_unit_with_owner(&content, owner, language.as_deref())
                .await?;
            println!("{}", serde_json::to_string(&saved)?);
        }
        Commands::Ingest {
            file,
            title,
            doc_type,
            component,
            project,
            content_type,
            language,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.display().to_string())
            });
            let mut meta = DocumentMeta::new(title, doc_type);
            meta.component = component;
            meta.project_id = project;
            meta.content_type = content_type.parse()?;
            meta.metadata = serde_json::json!({ "path": file.display().to_string() });

            let rt = open(&cfg).await?;
            let ingested = rt
                .coordinator
                .ingest_document(&text, meta, language.as_deref())
                .await?;
            println!(
                "Ingested document {} ({} chunks)",
                ingested.document_id, ingested.total_chunks
            );
        }
        Commands::Chunks { document_id, json } => {
            get::run_chunks(&cfg, &document_id, json).await?;
        }
        Commands::Search {
            query,
            content_type,
            limit,
            language,
            progressive,
            threshold,
            max_distance,
            json,
        } => {
            let rt = open(&cfg).await?;
            let store: SqliteStore = rt.coordinator.store().clone();
            let engine = SearchEngine::new(
                store,
                rt.generator,
                rt.translator,
                cfg.retrieval.clone(),
            );

            let policy = if progressive {
                ThresholdPolicy::Progressive {
                    thresholds: cfg.retrieval.progressive_thresholds.clone(),
                    max_distance: max_distance.unwrap_or(cfg.retrieval.progressive_max_distance),
                }
            } else {
                ThresholdPolicy::Fixed {
                    threshold: threshold.unwrap_or(cfg.retrieval.threshold),
                    max_distance: max_distance.unwrap_or(cfg.retrieval.max_distance),
                }
            };

            let mut request = SearchRequest::new(&query);
            request.limit = limit;
            request.language = language.as_deref();
            if let Some(ct) = content_type {
                request = request.content_type(ct.parse()?);
            }

            let outcome = engine.search(&request, &policy).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if outcome.results.is_empty() {
                println!("No results.");
            } else {
                if let Some(t) = outcome.used_threshold {
                    println!("threshold: {}", t);
                }
                for (i, hit) in outcome.results.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {} {} ({})",
                        i + 1,
                        hit.distance,
                        hit.content_type,
                        hit.id,
                        hit.created_at
                    );
                    let snippet: String = hit.content.chars().take(200).collect();
                    println!("    {}", snippet);
                }
            }
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}
