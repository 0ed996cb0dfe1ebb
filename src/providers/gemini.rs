//! Gemini generateContent and Imagen clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ImageModel, ProviderError, TextModel, map_reqwest_error};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const ENV_API_KEY: &str = "GEMINI_API_KEY";
const IMAGEN_MODEL: &str = "imagen-3.0-generate-002";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    #[serde(rename = "systemInstruction")]
    system_instruction: ContentPart<'a>,
    contents: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ContentPart<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn from_env(model: &str) -> Result<Self, ProviderError> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| ProviderError::MissingApiKey(ENV_API_KEY))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("signworks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart { text: system }],
            },
            contents: vec![ContentPart {
                parts: vec![TextPart { text: prompt }],
            }],
        };

        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let res = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let parsed: GenerateResponse = check_status(res)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Serde(e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .filter(|s| !s.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct PredictParameters {
    #[serde(rename = "sampleCount")]
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded", default)]
    bytes_base64_encoded: Option<String>,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiImageClient {
    http: Client,
    api_key: String,
}

impl GeminiImageClient {
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| ProviderError::MissingApiKey(ENV_API_KEY))?;
        let http = Client::builder()
            .timeout(IMAGE_TIMEOUT)
            .user_agent(concat!("signworks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { http, api_key })
    }
}

#[async_trait]
impl ImageModel for GeminiImageClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = PredictRequest {
            instances: vec![PredictInstance { prompt }],
            parameters: PredictParameters { sample_count: 1 },
        };

        let url = format!("{}/{}:predict", BASE_URL, IMAGEN_MODEL);
        let res = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let parsed: PredictResponse = check_status(res)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Serde(e.to_string()))?;

        let prediction = parsed
            .predictions
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;
        let bytes = prediction
            .bytes_base64_encoded
            .ok_or(ProviderError::EmptyResponse)?;
        let mime = prediction
            .mime_type
            .unwrap_or_else(|| "image/png".to_string());
        Ok(format!("data:{};base64,{}", mime, bytes))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    match res.status() {
        s if s.is_success() => Ok(res),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::InvalidApiKey),
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
        s => {
            let status = s.as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(ProviderError::Http { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_response_parses_first_text_part() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "reply text"}], "role": "model"}, "finishReason": "STOP"}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text = parsed.candidates[0].content.parts[0].text.as_deref();
        assert_eq!(text, Some("reply text"));
    }

    #[test]
    fn test_generate_response_tolerates_empty_candidates() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }

    #[test]
    fn test_predict_response_parses_image_bytes() {
        let raw = r#"{"predictions": [{"bytesBase64Encoded": "aWJt", "mimeType": "image/png"}]}"#;
        let parsed: PredictResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.predictions[0].bytes_base64_encoded.as_deref(),
            Some("aWJt")
        );
    }

    #[test]
    fn test_generate_request_shape() {
        let request = GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart { text: "sys" }],
            },
            contents: vec![ContentPart {
                parts: vec![TextPart { text: "hello" }],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
    }
}
