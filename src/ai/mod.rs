//! Client for the OpenAI-compatible AI gateway.
//!
//! Drives the chat concierge, caption generation, and creative image drafts.
//! Every call is bounded by the configured timeout; failures surface as
//! [`GatewayError`] so callers can decide between fallback copy, escalation,
//! or a 429.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiConfig;

/// Errors from the AI gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway returned an empty completion")]
    Empty,
    #[error("daily AI call limit reached ({limit})")]
    DailyLimitReached { limit: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

/// Shared gateway client. Cheap to clone; holds one reqwest pool.
#[derive(Clone)]
pub struct AiGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    image_model: String,
}

impl AiGateway {
    pub fn new(cfg: &AiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            image_model: cfg.image_model.clone(),
        })
    }

    /// Run a chat completion and return the assistant text.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, GatewayError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "AI gateway returned error");
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(GatewayError::Empty);
        }
        debug!(len = content.len(), "AI completion received");
        Ok(content)
    }

    /// Generate one image and return its URL.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, GatewayError> {
        let request = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: "1024x1024",
        };
        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "AI image generation returned error");
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        parsed
            .data
            .first()
            .and_then(|d| d.url.clone())
            .filter(|u| !u.is_empty())
            .ok_or(GatewayError::Empty)
    }
}

/// Strip markdown fences and stray prose from a model response that is
/// supposed to be JSON. Models wrap JSON in ```json blocks often enough that
/// parsing the raw text directly is a losing game.
pub fn sanitize_json(raw: &str) -> String {
    let trimmed = raw.trim();

    if trimmed.starts_with("```") {
        let inner = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .unwrap_or(trimmed);
        if let Some(end) = inner.rfind("```") {
            return inner[..end].trim().to_string();
        }
        return inner.trim().to_string();
    }

    // Prose around a bare object: keep the outermost braces.
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if start < end {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}
