//! # Context Vault
//!
//! Multilingual ingestion and vector-search core.
//!
//! Content in any language is normalized to English (technical identifiers
//! preserved), split into overlapping word windows when long, embedded, and
//! persisted in SQLite one transactional unit at a time. Search embeds the
//! query once and widens its distance threshold only when nothing matches.
//!
//! ## Architecture
//!
//! ```text
//! raw content ─▶ Translator ─▶ Chunker ─▶ Embedding ─▶ Coordinator ─▶ SQLite
//!                                                                     │
//! raw query ──▶ Translator ─▶ Embedding (once) ─▶ SearchEngine ◀──────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`translate`] | Term-preserving translation to English |
//! | [`chunk`] | Word-window chunking |
//! | [`embedding`] | Embedding providers and vector math |
//! | [`store`] | Read-side storage trait, SQLite and in-memory backends |
//! | [`search`] | Fixed and progressive threshold search |
//! | [`coordinator`] | Transactional save and ingest |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Error type |
//! | [`logging`] | `tracing` subscriber setup |

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod error;
pub mod get;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod search;
pub mod stats;
pub mod store;
pub mod translate;
