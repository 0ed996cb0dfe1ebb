//! OpenAI chat-completions and image-generation clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ImageModel, ProviderError, TextModel, map_reqwest_error};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const IMAGE_URL: &str = "https://api.openai.com/v1/images/generations";
const ENV_API_KEY: &str = "OPENAI_API_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn from_env(model: &str) -> Result<Self, ProviderError> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| ProviderError::MissingApiKey(ENV_API_KEY))?;
        Self::new(api_key, model)
    }

    pub fn new(api_key: String, model: &str) -> Result<Self, ProviderError> {
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
impl TextModel for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let res = self
            .http
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let parsed: ChatResponse = check_status(res)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Serde(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiImageClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiImageClient {
    pub fn from_env(model: &str) -> Result<Self, ProviderError> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| ProviderError::MissingApiKey(ENV_API_KEY))?;
        let http = Client::builder()
            .timeout(IMAGE_TIMEOUT)
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
impl ImageModel for OpenAiImageClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: "1024x1024",
        };

        let res = self
            .http
            .post(IMAGE_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let parsed: ImageResponse = check_status(res)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Serde(e.to_string()))?;

        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;
        // dall-e models return a hosted URL; gpt-image models return base64.
        if let Some(url) = datum.url {
            return Ok(url);
        }
        if let Some(b64) = datum.b64_json {
            return Ok(format!("data:image/png;base64,{}", b64));
        }
        Err(ProviderError::EmptyResponse)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    match res.status() {
        s if s.is_success() => Ok(res),
        StatusCode::UNAUTHORIZED => Err(ProviderError::InvalidApiKey),
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
        s => {
            let status = s.as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(ProviderError::Http { status, body })
        }
    }
}
