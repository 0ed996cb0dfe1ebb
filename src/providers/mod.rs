//! Model provider adapters.
//!
//! The pipeline talks to hosted text and image models through the
//! `TextModel` / `ImageModel` traits so the orchestrator (and its tests)
//! never depend on a concrete vendor. Two vendors are wired in: OpenAI
//! and Gemini. Which one is active is decided by the `ai_provider`
//! settings row, falling back to the config file.
//!
//! Calls are not retried: a transient provider failure surfaces to the
//! caller immediately and is handled by the pipeline's own skip/abort
//! rules.

pub mod gemini;
pub mod openai;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AiSection;
use crate::content::DbHandle;

/// Settings row that selects the active provider.
pub const PROVIDER_SETTING_KEY: &str = "ai_provider";

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: {0} environment variable not set")]
    MissingApiKey(&'static str),
    #[error("empty response from model")]
    EmptyResponse,
}

/// A hosted chat/completion model.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Send one system + user prompt pair and return the raw text reply.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;

    /// Vendor label used in logs.
    fn name(&self) -> &'static str;
}

/// A hosted image-generation model. Returns a URL (or data URI) for the
/// rendered image.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}

/// Resolve the active provider: settings row first, then config file.
/// Unrecognized stored values fall back to the config file value.
pub async fn active_provider(db: &DbHandle, ai: &AiSection) -> Provider {
    let stored = db
        .call(|store| store.get_setting(PROVIDER_SETTING_KEY))
        .await
        .ok()
        .flatten();
    if let Some(raw) = stored {
        match raw.parse::<Provider>() {
            Ok(p) => return p,
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring unrecognized ai_provider setting");
            }
        }
    }
    ai.provider.parse().unwrap_or(Provider::OpenAi)
}

/// Build the text + image model pair for a provider.
pub fn build_models(
    provider: Provider,
    ai: &AiSection,
) -> Result<(Arc<dyn TextModel>, Arc<dyn ImageModel>), ProviderError> {
    match provider {
        Provider::OpenAi => {
            let text = openai::OpenAiClient::from_env(&ai.openai_model)?;
            let image = openai::OpenAiImageClient::from_env(&ai.image_model)?;
            Ok((Arc::new(text), Arc::new(image)))
        }
        Provider::Gemini => {
            let text = gemini::GeminiClient::from_env(&ai.gemini_model)?;
            let image = gemini::GeminiImageClient::from_env()?;
            Ok((Arc::new(text), Arc::new(image)))
        }
    }
}

/// Extract JSON from a reply that might wrap it in markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        // Skip past any language identifier on the same line
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

/// Parse a typed value out of a model reply, unwrapping code fences first.
pub fn parse_model_json<T: for<'de> serde::Deserialize<'de>>(
    raw: &str,
) -> Result<T, ProviderError> {
    let json_str = extract_json(raw);
    if json_str.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    serde_json::from_str(json_str).map_err(|e| {
        ProviderError::Serde(format!(
            "{} (response preview: {})",
            e,
            json_str.chars().take(500).collect::<String>()
        ))
    })
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = "Here you go:\n```json\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let input = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(input), "[1, 2, 3]");
    }

    #[test]
    fn test_parse_model_json_typed() {
        #[derive(serde::Deserialize)]
        struct Reply {
            keywords: Vec<String>,
        }
        let raw = "```json\n{\"keywords\": [\"channel letters\", \"wayfinding\"]}\n```";
        let reply: Reply = parse_model_json(raw).unwrap();
        assert_eq!(reply.keywords.len(), 2);
    }

    #[test]
    fn test_parse_model_json_rejects_garbage() {
        let err = parse_model_json::<serde_json::Value>("not json at all {{{").unwrap_err();
        assert!(matches!(err, ProviderError::Serde(_)));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("claude".parse::<Provider>().is_err());
    }
}
