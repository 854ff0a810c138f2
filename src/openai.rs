//! Minimal OpenAI-compatible client, the AI collaborator behind the gateway.
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key, submitted code, or response bodies beyond short previews.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::config::OpenAISettings;
use crate::error::GatewayError;
use crate::gateway::ContentModel;
use crate::util::{strip_code_fence, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  pub fn new(settings: &OpenAISettings) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
    Ok(Self {
      client,
      api_key: settings.api_key.clone(),
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      model: settings.model.clone(),
    })
  }

  /// One chat.completions round trip; returns the first choice's content.
  async fn chat(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    response_format: Option<ResponseFormat>,
  ) -> Result<String, GatewayError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format,
      max_tokens: None,
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "pymaster-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
      error!(elapsed = ?start.elapsed(), status = status.as_u16(), %message, "AI call rejected");
      return Err(GatewayError::Http { status: status.as_u16(), message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    Ok(text)
  }
}

#[async_trait]
impl ContentModel for OpenAI {
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn complete_json(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<serde_json::Value, GatewayError> {
    let format = Some(ResponseFormat { r#type: "json_object".into() });
    let text = self.chat(system, user, temperature, format).await?;
    let body = strip_code_fence(&text);
    if body.is_empty() {
      return Err(GatewayError::EmptyResponse);
    }
    serde_json::from_str(body).map_err(|e| {
      debug!(preview = %trunc_for_log(body, 200), "Unparseable JSON from model");
      GatewayError::Parse(e.to_string())
    })
  }

  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn complete_text(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, GatewayError> {
    Ok(self.chat(system, user, temperature, None).await?.trim().to_string())
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
