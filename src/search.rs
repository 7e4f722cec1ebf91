//! Similarity search with fixed and progressive distance thresholds.
//!
//! A search translates the query once, embeds it once, then asks the
//! [`Store`] for records within a distance cutoff. Smaller distance means
//! more similar; `similarity = max(0, 1 - distance)`.
//!
//! # Threshold policies
//!
//! - [`ThresholdPolicy::Fixed`]: one scan, keeping records with
//!   `distance <= threshold` and `distance <= max_distance`.
//! - [`ThresholdPolicy::Progressive`]: scans with each threshold in
//!   ascending order (each also capped by `max_distance`) and stops at the
//!   first non-empty result set. The query vector is reused for every
//!   attempt.
//!
//! Results are ordered by ascending distance, then newer `created_at`, then
//! id, and truncated to the requested limit.

use serde::Serialize;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingGenerator;
use crate::error::{Error, Result};
use crate::models::{ContentType, SearchHit};
use crate::store::{NearestQuery, Store};
use crate::translate::Translator;

/// Distance cutoff policy for one search.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdPolicy {
    Fixed { threshold: f64, max_distance: f64 },
    Progressive { thresholds: Vec<f64>, max_distance: f64 },
}

impl ThresholdPolicy {
    pub fn fixed_from(config: &RetrievalConfig) -> Self {
        ThresholdPolicy::Fixed {
            threshold: config.threshold,
            max_distance: config.max_distance,
        }
    }

    pub fn progressive_from(config: &RetrievalConfig) -> Self {
        ThresholdPolicy::Progressive {
            thresholds: config.progressive_thresholds.clone(),
            max_distance: config.progressive_max_distance,
        }
    }

    pub fn validate(&self) -> Result<()> {
        fn check(name: &str, value: f64) -> Result<()> {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::validation(format!(
                    "{} must be a finite, non-negative number (got {})",
                    name, value
                )));
            }
            Ok(())
        }

        match self {
            ThresholdPolicy::Fixed {
                threshold,
                max_distance,
            } => {
                check("threshold", *threshold)?;
                check("max_distance", *max_distance)
            }
            ThresholdPolicy::Progressive {
                thresholds,
                max_distance,
            } => {
                check("max_distance", *max_distance)?;
                if thresholds.is_empty() {
                    return Err(Error::validation("progressive thresholds must not be empty"));
                }
                for t in thresholds {
                    check("threshold", *t)?;
                }
                if thresholds.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::validation(
                        "progressive thresholds must be strictly ascending",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Inputs for a single search call.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub content_type: Option<ContentType>,
    /// `None` uses `retrieval.default_limit`.
    pub limit: Option<usize>,
    /// Language of the query; `None` or `"auto"` lets the translator detect it.
    pub language: Option<&'a str>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            content_type: None,
            limit: None,
            language: None,
        }
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn language(mut self, language: &'a str) -> Self {
        self.language = Some(language);
        self
    }
}

/// Ranked results plus how they were obtained.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    /// Threshold that produced `results`; `None` when nothing matched.
    pub used_threshold: Option<f64>,
    pub query_was_translated: bool,
}

/// Search front end over any [`Store`].
pub struct SearchEngine<S: Store> {
    store: S,
    generator: EmbeddingGenerator,
    translator: Arc<dyn Translator>,
    retrieval: RetrievalConfig,
}

impl<S: Store> SearchEngine<S> {
    pub fn new(
        store: S,
        generator: EmbeddingGenerator,
        translator: Arc<dyn Translator>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            generator,
            translator,
            retrieval,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fixed-threshold search with the configured threshold and ceiling.
    pub async fn search_fixed(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        self.search(request, &ThresholdPolicy::fixed_from(&self.retrieval))
            .await
    }

    /// Progressive search with the configured threshold sequence and ceiling.
    pub async fn search_progressive(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        self.search(request, &ThresholdPolicy::progressive_from(&self.retrieval))
            .await
    }

    /// Run a search under `policy`.
    ///
    /// Input is validated before any translation or embedding call is made.
    pub async fn search(
        &self,
        request: &SearchRequest<'_>,
        policy: &ThresholdPolicy,
    ) -> Result<SearchOutcome> {
        let limit = self.validate(request, policy)?;

        let translation = self
            .translator
            .translate(request.query, request.language)
            .await
            .into_result();
        let query_vec = self.generator.embed(&translation.translated_text).await?;

        let (results, used_threshold) = match policy {
            ThresholdPolicy::Fixed {
                threshold,
                max_distance,
            } => {
                let hits = self
                    .nearest(&query_vec, request.content_type, threshold.min(*max_distance), limit)
                    .await?;
                let used = (!hits.is_empty()).then_some(*threshold);
                (hits, used)
            }
            ThresholdPolicy::Progressive {
                thresholds,
                max_distance,
            } => {
                let mut found = (Vec::new(), None);
                for threshold in thresholds {
                    let cutoff = threshold.min(*max_distance);
                    let hits = self
                        .nearest(&query_vec, request.content_type, cutoff, limit)
                        .await?;
                    tracing::debug!(
                        target: "search",
                        "threshold {} (cutoff {}): {} hits",
                        threshold,
                        cutoff,
                        hits.len()
                    );
                    if !hits.is_empty() {
                        found = (hits, Some(*threshold));
                        break;
                    }
                }
                found
            }
        };

        tracing::info!(
            target: "search",
            "{} results (threshold {:?}, translated: {})",
            results.len(),
            used_threshold,
            translation.was_translated
        );

        Ok(SearchOutcome {
            results,
            used_threshold,
            query_was_translated: translation.was_translated,
        })
    }

    async fn nearest(
        &self,
        query_vec: &[f32],
        content_type: Option<ContentType>,
        max_distance: f64,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.store
            .nearest(
                query_vec,
                &NearestQuery {
                    content_type,
                    max_distance,
                    limit,
                },
            )
            .await
    }

    fn validate(&self, request: &SearchRequest<'_>, policy: &ThresholdPolicy) -> Result<usize> {
        if request.query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let limit = request.limit.unwrap_or(self.retrieval.default_limit);
        if limit == 0 || limit > self.retrieval.max_limit {
            return Err(Error::validation(format!(
                "limit must be between 1 and {} (got {})",
                self.retrieval.max_limit, limit
            )));
        }
        policy.validate()?;
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::models::EmbeddingRecord;
    use crate::store::InMemoryStore;
    use crate::translate::DisabledTranslator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds every query to the origin and counts calls.
    struct OriginEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for OriginEmbedder {
        fn model_name(&self) -> &str {
            "origin"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.0, 0.0]).collect())
        }
    }

    fn record_at(id: &str, distance: f32, content_type: ContentType) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            content: format!("record {id}"),
            content_hash: String::new(),
            vector: vec![distance, 0.0],
            content_type,
            metadata: serde_json::json!({}),
            original_language: "en".to_string(),
            was_translated: false,
            document_id: None,
            chunk_index: None,
            chunk_total: None,
            model: "origin".to_string(),
            created_at: 1_700_000_000,
        }
    }

    fn engine(records: Vec<EmbeddingRecord>) -> (SearchEngine<InMemoryStore>, Arc<AtomicUsize>) {
        let store = InMemoryStore::default();
        for r in records {
            store.insert_record(r).unwrap();
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = EmbeddingGenerator::new(
            Arc::new(OriginEmbedder {
                calls: calls.clone(),
            }),
            1000,
        );
        let engine = SearchEngine::new(
            store,
            generator,
            Arc::new(DisabledTranslator),
            RetrievalConfig::default(),
        );
        (engine, calls)
    }

    #[tokio::test]
    async fn test_progressive_reports_first_non_empty_threshold() {
        let (engine, calls) = engine(vec![record_at("far", 1.3, ContentType::Prompt)]);
        let outcome = engine
            .search_progressive(&SearchRequest::new("anything"))
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].id, "far");
        assert_eq!(outcome.used_threshold, Some(1.5));
        assert_eq!(outcome.results[0].similarity, 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progressive_empty_everywhere() {
        let (engine, calls) = engine(vec![record_at("very-far", 9.0, ContentType::Prompt)]);
        let outcome = engine
            .search_progressive(&SearchRequest::new("anything"))
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.used_threshold, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progressive_ceiling_caps_every_attempt() {
        let (engine, _) = engine(vec![record_at("r", 1.8, ContentType::Prompt)]);
        let policy = ThresholdPolicy::Progressive {
            thresholds: vec![1.0, 2.0, 3.0],
            max_distance: 1.5,
        };
        let outcome = engine
            .search(&SearchRequest::new("q"), &policy)
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn test_fixed_secondary_ceiling_excludes() {
        let (engine, _) = engine(vec![record_at("r", 1.0, ContentType::Prompt)]);
        let policy = ThresholdPolicy::Fixed {
            threshold: 1.5,
            max_distance: 0.8,
        };
        let outcome = engine
            .search(&SearchRequest::new("q"), &policy)
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.used_threshold, None);

        let policy = ThresholdPolicy::Fixed {
            threshold: 1.5,
            max_distance: 2.0,
        };
        let outcome = engine
            .search(&SearchRequest::new("q"), &policy)
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.used_threshold, Some(1.5));
    }

    #[tokio::test]
    async fn test_fixed_orders_and_truncates() {
        let (engine, _) = engine(vec![
            record_at("c", 0.9, ContentType::Prompt),
            record_at("a", 0.1, ContentType::Prompt),
            record_at("b", 0.5, ContentType::Prompt),
        ]);
        let outcome = engine
            .search_fixed(&SearchRequest::new("q").limit(2))
            .await
            .unwrap();
        let ids: Vec<&str> = outcome.results.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((outcome.results[0].similarity - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_content_type_filter() {
        let (engine, _) = engine(vec![
            record_at("p", 0.1, ContentType::Prompt),
            record_at("s", 0.2, ContentType::SourceCode),
        ]);
        let outcome = engine
            .search_fixed(&SearchRequest::new("q").content_type(ContentType::SourceCode))
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].content_type, ContentType::SourceCode);
    }

    #[tokio::test]
    async fn test_validation_happens_before_embedding() {
        let (engine, calls) = engine(vec![record_at("r", 0.1, ContentType::Prompt)]);

        let cases: Vec<(SearchRequest<'_>, ThresholdPolicy)> = vec![
            (SearchRequest::new("   "), ThresholdPolicy::fixed_from(&RetrievalConfig::default())),
            (SearchRequest::new("q").limit(0), ThresholdPolicy::fixed_from(&RetrievalConfig::default())),
            (SearchRequest::new("q").limit(101), ThresholdPolicy::fixed_from(&RetrievalConfig::default())),
            (
                SearchRequest::new("q"),
                ThresholdPolicy::Fixed { threshold: f64::NAN, max_distance: 1.0 },
            ),
            (
                SearchRequest::new("q"),
                ThresholdPolicy::Progressive { thresholds: vec![], max_distance: 1.0 },
            ),
            (
                SearchRequest::new("q"),
                ThresholdPolicy::Progressive { thresholds: vec![1.0, 1.0], max_distance: 2.0 },
            ),
            (
                SearchRequest::new("q"),
                ThresholdPolicy::Progressive { thresholds: vec![-1.0, 1.0], max_distance: 2.0 },
            ),
        ];
        for (request, policy) in cases {
            let err = engine.search(&request, &policy).await.unwrap_err();
            assert!(err.is_validation(), "{request:?} {policy:?}: {err}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
