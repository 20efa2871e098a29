use std::time::Duration;

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::warn;

use agora_types::api::{AiChatRequest, AiChatResponse, Claims};

use crate::auth::AppState;
use crate::error::ApiError;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a Q&A platform. Answer questions clearly and concisely.";

/// Thin client for an OpenAI-compatible chat completions endpoint. Upstream
/// failures are logged in full but reported to callers as a bare 502.
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl AiClient {
    pub fn new(api_key: String, base_url: String) -> anyhow::Result<Self> {
        if api_key.is_empty() {
            warn!("OPENAI_API_KEY is not set; assistant requests will fail upstream");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    pub async fn chat(&self, prompt: &str, model: Option<&str>) -> Result<String, ApiError> {
        let model = match model {
            Some(m) if !m.trim().is_empty() => m,
            _ => DEFAULT_MODEL,
        };
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.2,
        });

        let response = self
            .http
            .post(format!(
                "{}/v1/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("AI request failed: {}", e);
                ApiError::Upstream
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            warn!("AI backend returned {}: {}", status, detail);
            return Err(ApiError::Upstream);
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            warn!("AI response unreadable: {}", e);
            ApiError::Upstream
        })?;
        let answer = completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(answer)
    }
}

/// Ask the assistant a question. Available to any authenticated user.
pub async fn chat(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<AiChatRequest>,
) -> Result<Json<AiChatResponse>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("Prompt is required.".to_string()));
    }
    let answer = state.ai.chat(&req.prompt, req.model.as_deref()).await?;
    Ok(Json(AiChatResponse { answer }))
}
