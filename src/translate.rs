//! Technical-term-preserving translation to English.
//!
//! Everything stored in the vector index is English. Input in any other
//! language is sent to a language model that detects the language,
//! translates it, and must leave technical identifiers (error codes, table
//! and field names, module paths, function names) untouched.
//!
//! Translation is enrichment, not a precondition for storage: every failure
//! (transport, HTTP status, malformed model output) degrades to
//! [`TranslationOutcome::Fallback`], which carries the original text. The
//! [`Translator`] trait is therefore infallible.
//!
//! # Providers
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"disabled"` | [`DisabledTranslator`] |
//! | `"openai"` | [`LlmTranslator`] over `/v1/chat/completions` |
//! | `"ollama"` | [`LlmTranslator`] over `/api/chat` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TranslationConfig;
use crate::error::{Error, Result};

pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Flat translation result handed to the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub was_translated: bool,
    pub detected_language: String,
    pub technical_terms: Vec<String>,
}

impl TranslationResult {
    /// Provenance block stored under `metadata.translation`.
    pub fn provenance(&self) -> serde_json::Value {
        serde_json::json!({
            "was_translated": self.was_translated,
            "detected_language": self.detected_language,
            "technical_terms": self.technical_terms,
        })
    }
}

/// What happened to a piece of text on its way to English.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationOutcome {
    /// Input already English (or translation disabled); nothing was called.
    Passthrough { text: String, language: String },
    /// The model produced an English translation.
    Translated(TranslationResult),
    /// Translation was attempted and failed; original text is kept.
    Fallback { text: String, reason: String },
}

impl TranslationOutcome {
    pub fn into_result(self) -> TranslationResult {
        match self {
            TranslationOutcome::Passthrough { text, language } => TranslationResult {
                technical_terms: extract_technical_terms(&text),
                original_text: text.clone(),
                translated_text: text,
                was_translated: false,
                detected_language: language,
            },
            TranslationOutcome::Translated(r) => r,
            TranslationOutcome::Fallback { text, .. } => TranslationResult {
                technical_terms: extract_technical_terms(&text),
                original_text: text.clone(),
                translated_text: text,
                was_translated: false,
                detected_language: UNKNOWN_LANGUAGE.to_string(),
            },
        }
    }
}

/// Normalizes text to English. Never fails; see [`TranslationOutcome`].
#[async_trait]
pub trait Translator: Send + Sync {
    /// `source_language` is a language code hint; `None` or `"auto"` asks
    /// the model to detect it.
    async fn translate(&self, text: &str, source_language: Option<&str>) -> TranslationOutcome;
}

/// True for `en`, `en-US`, `en_GB`, `english` (any case).
pub fn is_english(language: &str) -> bool {
    let lang = language.trim().to_ascii_lowercase();
    lang == "en" || lang == "english" || lang.starts_with("en-") || lang.starts_with("en_")
}

fn is_auto(language: Option<&str>) -> bool {
    match language {
        None => true,
        Some(l) => {
            let l = l.trim();
            l.is_empty() || l.eq_ignore_ascii_case("auto")
        }
    }
}

/// Normalized language label stored on records; `unknown` when the
/// caller asked for detection.
pub fn language_label(language: Option<&str>) -> String {
    match language {
        Some(l) if is_english(l) => "en".to_string(),
        Some(l) if !is_auto(Some(l)) => l.trim().to_ascii_lowercase(),
        _ => UNKNOWN_LANGUAGE.to_string(),
    }
}

// ============ Technical terms ============

/// Scan text for identifiers that must survive translation verbatim.
///
/// Picks up uppercase codes (`ERR_42`, `HTTP`, `ORDER_TOTAL`), snake_case
/// names, `::` and dotted paths, CamelCase identifiers with an inner
/// capital, and call-like tokens (`finalize()`). Returned sorted and
/// de-duplicated.
pub fn extract_technical_terms(text: &str) -> Vec<String> {
    let mut terms = BTreeSet::new();
    for raw in text.split_whitespace() {
        let token = raw.trim_matches(|c: char| {
            matches!(
                c,
                ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '`' | '[' | ']' | '{' | '}' | '<' | '>'
            )
        });
        let token = trim_sentence_punctuation(token);
        if is_technical_term(token) {
            terms.insert(token.to_string());
        }
    }
    terms.into_iter().collect()
}

fn trim_sentence_punctuation(token: &str) -> &str {
    let token = token.trim_start_matches('(');
    let token = token.trim_end_matches(['.', ',', ';', ':', '!', '?']);
    // keep a balanced `()` suffix, drop a dangling closing paren
    if token.ends_with(')') && !token.ends_with("()") && !token.contains('(') {
        token.trim_end_matches(')')
    } else {
        token
    }
}

fn is_technical_term(token: &str) -> bool {
    if token.chars().count() < 2 {
        return false;
    }
    if !token.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '(' | ')' | '-' | '/'))
    {
        return false;
    }

    let letters: Vec<char> = token.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    let all_upper = letters.iter().all(|c| c.is_ascii_uppercase());
    let has_underscore = token.contains('_');
    let has_path = token.contains("::")
        || (token.contains('.')
            && !token.starts_with('.')
            && !token.ends_with('.')
            && token.split('.').all(|p| !p.is_empty()));
    let is_call = token.ends_with("()");
    let inner_capital = token
        .chars()
        .skip(1)
        .any(|c| c.is_ascii_uppercase())
        && token.chars().any(|c| c.is_ascii_lowercase());

    (all_upper && letters.len() >= 2) || has_underscore || has_path || is_call || inner_capital
}

// ============ Prompt + response parsing ============

const SYSTEM_PROMPT: &str = "You translate technical text into English. \
Detect the source language, translate the text to English, and keep every \
technical identifier exactly as written: uppercase codes, error codes, \
function, module, class, table and field names, file paths and code. \
Reply with a single JSON object: \
{\"detected_language\": \"<ISO 639-1 code>\", \"translated_text\": \"<English text>\", \
\"technical_terms\": [\"<identifier>\", ...]}. \
If the text is already English, return it unchanged with detected_language \"en\".";

fn user_prompt(text: &str, source_language: Option<&str>, protected: &[String]) -> String {
    let mut prompt = String::new();
    match source_language {
        Some(lang) if !is_auto(Some(lang)) => {
            prompt.push_str(&format!("Source language hint: {}\n", lang.trim()));
        }
        _ => prompt.push_str("Source language: detect it\n"),
    }
    if !protected.is_empty() {
        prompt.push_str("Preserve these identifiers verbatim: ");
        prompt.push_str(&protected.join(", "));
        prompt.push('\n');
    }
    prompt.push_str("\nText:\n");
    prompt.push_str(text);
    prompt
}

#[derive(Debug, Deserialize)]
struct ModelTranslation {
    #[serde(default)]
    detected_language: Option<String>,
    translated_text: String,
    #[serde(default)]
    technical_terms: Vec<String>,
}

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        return rest.trim().trim_end_matches("```").trim();
    }
    trimmed
}

/// Parse the model's JSON reply into a [`TranslationResult`].
///
/// `protected` terms found locally are merged with the model's list.
pub fn parse_model_reply(
    original: &str,
    reply: &str,
    protected: &[String],
) -> Result<TranslationResult> {
    let body = strip_code_fence(reply);
    let parsed: ModelTranslation = serde_json::from_str(body)
        .map_err(|e| Error::Translation(format!("malformed model reply: {}", e)))?;

    let translated = parsed.translated_text.trim().to_string();
    if translated.is_empty() {
        return Err(Error::Translation("model returned an empty translation".into()));
    }

    let detected = parsed
        .detected_language
        .map(|l| l.trim().to_ascii_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

    let mut terms: BTreeSet<String> = protected.iter().cloned().collect();
    terms.extend(
        parsed
            .technical_terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
    );

    let was_translated = !is_english(&detected) || translated != original.trim();

    Ok(TranslationResult {
        original_text: original.to_string(),
        translated_text: translated,
        was_translated,
        detected_language: detected,
        technical_terms: terms.into_iter().collect(),
    })
}

// ============ Backends ============

/// Used when `translation.provider = "disabled"`: text is stored as given.
pub struct DisabledTranslator;

#[async_trait]
impl Translator for DisabledTranslator {
    async fn translate(&self, text: &str, source_language: Option<&str>) -> TranslationOutcome {
        TranslationOutcome::Passthrough {
            text: text.to_string(),
            language: language_label(source_language),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatApi {
    OpenAI,
    Ollama,
}

/// Chat-model translator for OpenAI-compatible and Ollama endpoints.
pub struct LlmTranslator {
    api: ChatApi,
    model: String,
    url: String,
    api_key: Option<String>,
    temperature: f32,
    client: reqwest::Client,
}

impl LlmTranslator {
    pub fn openai(config: &TranslationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::validation("OPENAI_API_KEY environment variable not set"))?;
        Self::build(
            ChatApi::OpenAI,
            config,
            "https://api.openai.com",
            Some(api_key),
        )
    }

    pub fn ollama(config: &TranslationConfig) -> Result<Self> {
        Self::build(ChatApi::Ollama, config, "http://localhost:11434", None)
    }

    fn build(
        api: ChatApi,
        config: &TranslationConfig,
        default_url: &str,
        api_key: Option<String>,
    ) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::validation("translation.model must be specified"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Translation(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            api_key,
            temperature: config.temperature,
            client,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let base = self.url.trim_end_matches('/');
        let (endpoint, body) = match self.api {
            ChatApi::OpenAI => (
                format!("{}/v1/chat/completions", base),
                serde_json::json!({
                    "model": self.model,
                    "temperature": self.temperature,
                    "response_format": { "type": "json_object" },
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        { "role": "user", "content": prompt },
                    ],
                }),
            ),
            ChatApi::Ollama => (
                format!("{}/api/chat", base),
                serde_json::json!({
                    "model": self.model,
                    "stream": false,
                    "format": "json",
                    "options": { "temperature": self.temperature },
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        { "role": "user", "content": prompt },
                    ],
                }),
            ),
        };

        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Translation(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Translation(format!("failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(Error::Translation(format!("model API error {}: {}", status, text)));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| Error::Translation(format!("invalid response envelope: {}", e)))?;
        let content = match self.api {
            ChatApi::OpenAI => json
                .pointer("/choices/0/message/content")
                .and_then(|c| c.as_str()),
            ChatApi::Ollama => json.pointer("/message/content").and_then(|c| c.as_str()),
        };
        content
            .map(str::to_string)
            .ok_or_else(|| Error::Translation("response has no message content".into()))
    }

    async fn try_translate(
        &self,
        text: &str,
        source_language: Option<&str>,
    ) -> Result<TranslationResult> {
        let protected = extract_technical_terms(text);
        let reply = self
            .complete(&user_prompt(text, source_language, &protected))
            .await?;
        let result = parse_model_reply(text, &reply, &protected)?;

        let lost: Vec<&String> = protected
            .iter()
            .filter(|t| !result.translated_text.contains(t.as_str()))
            .collect();
        if !lost.is_empty() {
            tracing::warn!(
                target: "translate",
                "technical terms altered by translation: {:?}",
                lost
            );
        }
        Ok(result)
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, source_language: Option<&str>) -> TranslationOutcome {
        if let Some(lang) = source_language {
            if is_english(lang) {
                return TranslationOutcome::Passthrough {
                    text: text.to_string(),
                    language: "en".to_string(),
                };
            }
        }
        if text.trim().is_empty() {
            return TranslationOutcome::Passthrough {
                text: text.to_string(),
                language: language_label(source_language),
            };
        }

        match self.try_translate(text, source_language).await {
            Ok(result) => {
                tracing::debug!(
                    target: "translate",
                    "translated {} chars from '{}'",
                    text.len(),
                    result.detected_language
                );
                TranslationOutcome::Translated(result)
            }
            Err(e) => {
                tracing::warn!(target: "translate", "translation skipped: {}", e);
                TranslationOutcome::Fallback {
                    text: text.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Create the configured [`Translator`].
pub fn create_translator(config: &TranslationConfig) -> Result<Arc<dyn Translator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledTranslator)),
        "openai" => Ok(Arc::new(LlmTranslator::openai(config)?)),
        "ollama" => Ok(Arc::new(LlmTranslator::ollama(config)?)),
        other => Err(Error::validation(format!(
            "unknown translation provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_translator() -> LlmTranslator {
        let config = TranslationConfig {
            provider: "ollama".to_string(),
            model: Some("test-model".to_string()),
            // port 9 (discard) is closed on test machines: connection refused
            url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 2,
            temperature: 0.0,
        };
        LlmTranslator::ollama(&config).unwrap()
    }

    #[test]
    fn test_is_english() {
        for l in ["en", "EN", "en-US", "en_GB", "English", " en "] {
            assert!(is_english(l), "{l}");
        }
        for l in ["es", "de", "auto", "", "eng-x"] {
            assert!(!is_english(l), "{l}");
        }
    }

    #[test]
    fn test_language_label() {
        assert_eq!(language_label(Some("en-US")), "en");
        assert_eq!(language_label(Some("ES")), "es");
        assert_eq!(language_label(Some("auto")), "unknown");
        assert_eq!(language_label(None), "unknown");
    }

    #[test]
    fn test_extract_technical_terms() {
        let text = "El error ERR_PAYMENT_42 ocurre en billing::invoice cuando \
                    la tabla order_items y la función finalizeOrder() fallan (ver HTTP).";
        let terms = extract_technical_terms(text);
        for t in [
            "ERR_PAYMENT_42",
            "billing::invoice",
            "order_items",
            "finalizeOrder()",
            "HTTP",
        ] {
            assert!(terms.contains(&t.to_string()), "missing {t}: {terms:?}");
        }
        for plain in ["El", "error", "tabla", "ver"] {
            assert!(!terms.contains(&plain.to_string()), "{plain} is not a term");
        }
    }

    #[test]
    fn test_dotted_paths_but_not_sentence_ends() {
        let terms = extract_technical_terms("Edit config.toml and read it. Done.");
        assert_eq!(terms, vec!["config.toml".to_string()]);
    }

    #[test]
    fn test_parse_model_reply() {
        let reply = r#"{"detected_language":"es","translated_text":"The ERR_42 error occurs",
                        "technical_terms":["ERR_42"]}"#;
        let result = parse_model_reply("Ocurre el error ERR_42", reply, &["ERR_42".into()]).unwrap();
        assert!(result.was_translated);
        assert_eq!(result.detected_language, "es");
        assert_eq!(result.translated_text, "The ERR_42 error occurs");
        assert_eq!(result.technical_terms, vec!["ERR_42".to_string()]);
        assert_eq!(result.original_text, "Ocurre el error ERR_42");
    }

    #[test]
    fn test_parse_model_reply_with_code_fence() {
        let reply = "```json\n{\"detected_language\":\"de\",\"translated_text\":\"Hello\"}\n```";
        let result = parse_model_reply("Hallo", reply, &[]).unwrap();
        assert_eq!(result.translated_text, "Hello");
        assert_eq!(result.detected_language, "de");
    }

    #[test]
    fn test_parse_model_reply_english_unchanged() {
        let reply = r#"{"detected_language":"en","translated_text":"Already English"}"#;
        let result = parse_model_reply("Already English", reply, &[]).unwrap();
        assert!(!result.was_translated);
    }

    #[test]
    fn test_parse_model_reply_malformed() {
        assert!(parse_model_reply("x", "not json at all", &[]).is_err());
        assert!(parse_model_reply("x", r#"{"translated_text":"   "}"#, &[]).is_err());
        assert!(parse_model_reply("x", r#"{"detected_language":"fr"}"#, &[]).is_err());
    }

    #[test]
    fn test_fallback_result_shape() {
        let result = TranslationOutcome::Fallback {
            text: "Hola MUNDO_ID".to_string(),
            reason: "boom".to_string(),
        }
        .into_result();
        assert_eq!(result.translated_text, "Hola MUNDO_ID");
        assert_eq!(result.original_text, "Hola MUNDO_ID");
        assert!(!result.was_translated);
        assert_eq!(result.detected_language, "unknown");
        assert_eq!(result.technical_terms, vec!["MUNDO_ID".to_string()]);
    }

    #[tokio::test]
    async fn test_english_input_is_returned_unchanged() {
        let translator = unreachable_translator();
        for text in ["Fix the ORDER_TOTAL rounding", "", "  spaced  text  "] {
            let outcome = translator.translate(text, Some("en")).await;
            let result = outcome.into_result();
            assert_eq!(result.translated_text, text);
            assert!(!result.was_translated);
            assert_eq!(result.detected_language, "en");
        }
    }

    #[tokio::test]
    async fn test_call_failure_degrades_to_original_text() {
        let translator = unreachable_translator();
        let outcome = translator.translate("Hola mundo", Some("es")).await;
        assert!(matches!(outcome, TranslationOutcome::Fallback { .. }));
        let result = outcome.into_result();
        assert_eq!(result.translated_text, "Hola mundo");
        assert!(!result.was_translated);
        assert_eq!(result.detected_language, UNKNOWN_LANGUAGE);
    }

    #[tokio::test]
    async fn test_disabled_translator_passthrough() {
        let outcome = DisabledTranslator.translate("Bonjour", Some("fr")).await;
        assert!(matches!(outcome, TranslationOutcome::Passthrough { .. }));
        let result = outcome.into_result();
        assert_eq!(result.translated_text, "Bonjour");
        assert!(!result.was_translated);
        assert_eq!(result.detected_language, "fr");
    }
}
