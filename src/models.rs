//! Core data models.
//!
//! These types describe what flows through ingestion and retrieval:
//! embedding records (the indexed unit), the specialized records that own
//! them (prompts, documentation snippets, chunked documents), and search
//! hits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of content stored in an [`EmbeddingRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Prompt,
    SourceCode,
    Template,
    Documentation,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Prompt,
        ContentType::SourceCode,
        ContentType::Template,
        ContentType::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Prompt => "prompt",
            ContentType::SourceCode => "source_code",
            ContentType::Template => "template",
            ContentType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(ContentType::Prompt),
            "source_code" => Ok(ContentType::SourceCode),
            "template" => Ok(ContentType::Template),
            "documentation" => Ok(ContentType::Documentation),
            other => Err(Error::validation(format!(
                "unknown content type '{}'; expected prompt, source_code, template, or documentation",
                other
            ))),
        }
    }
}

/// The atomic indexed unit: one embedded piece of English text.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub content: String,
    pub content_hash: String,
    #[serde(skip_serializing)]
    pub vector: Vec<f32>,
    pub content_type: ContentType,
    pub metadata: serde_json::Value,
    pub original_language: String,
    pub was_translated: bool,
    pub document_id: Option<String>,
    pub chunk_index: Option<i64>,
    pub chunk_total: Option<i64>,
    pub model: String,
    pub created_at: i64,
}

/// A user prompt that owns exactly one embedding.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRecord {
    pub id: String,
    pub embedding_id: String,
    pub session_id: String,
    pub project_id: String,
    pub original_text: String,
    pub language: String,
    pub response_summary: Option<String>,
    pub created_at: i64,
}

/// A documentation snippet that owns exactly one embedding.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentationRecord {
    pub id: String,
    pub embedding_id: String,
    pub title: String,
    pub component: Option<String>,
    pub original_text: String,
    pub language: String,
    pub created_at: i64,
}

/// An uploaded document whose text lives only in its chunk records.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub doc_type: String,
    pub component: Option<String>,
    pub project_id: Option<String>,
    pub original_language: String,
    pub total_chunks: i64,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Caller-supplied description of a document passed to `ingest_document`.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    pub doc_type: String,
    pub component: Option<String>,
    pub project_id: Option<String>,
    /// Content type stamped on every chunk record.
    pub content_type: ContentType,
    pub metadata: serde_json::Value,
}

impl DocumentMeta {
    pub fn new(title: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            doc_type: doc_type.into(),
            component: None,
            project_id: None,
            content_type: ContentType::Documentation,
            metadata: serde_json::json!({}),
        }
    }
}

/// The specialized record created alongside an embedding by
/// `save_unit_with_owner`.
#[derive(Debug, Clone)]
pub enum Owner {
    Prompt {
        session_id: String,
        project_id: String,
        response_summary: Option<String>,
    },
    Documentation {
        title: String,
        component: Option<String>,
    },
}

impl Owner {
    pub fn content_type(&self) -> ContentType {
        match self {
            Owner::Prompt { .. } => ContentType::Prompt,
            Owner::Documentation { .. } => ContentType::Documentation,
        }
    }
}

/// Identifiers produced by `save_unit_with_owner`.
#[derive(Debug, Clone, Serialize)]
pub struct SavedUnit {
    pub embedding_id: String,
    pub owner_id: String,
}

/// Result of a successful `ingest_document`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub document_id: String,
    pub total_chunks: i64,
}

/// One search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: serde_json::Value,
    /// Vector distance to the query; lower is closer.
    pub distance: f64,
    /// `max(0, 1 - distance)`.
    pub similarity: f64,
    /// ISO 8601.
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
}

/// Similarity score derived from a distance, clamped to `[0, 1]`.
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip_names() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
        assert!("video".parse::<ContentType>().unwrap_err().is_validation());
    }

    #[test]
    fn test_content_type_serde_name() {
        let json = serde_json::to_string(&ContentType::SourceCode).unwrap();
        assert_eq!(json, "\"source_code\"");
    }

    #[test]
    fn test_similarity_clamped() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-12);
        assert_eq!(similarity_from_distance(1.0), 0.0);
        assert_eq!(similarity_from_distance(2.0), 0.0);
    }

    #[test]
    fn test_owner_content_type() {
        let owner = Owner::Prompt {
            session_id: "s".into(),
            project_id: "p".into(),
            response_summary: None,
        };
        assert_eq!(owner.content_type(), ContentType::Prompt);
        let owner = Owner::Documentation {
            title: "t".into(),
            component: None,
        };
        assert_eq!(owner.content_type(), ContentType::Documentation);
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
