//! Language-model clients.
//!
//! A [`Generator`] turns a fully rendered prompt into text plus the token
//! counts the provider reports. Two providers are supported:
//!
//! | Provider | Endpoint | API key |
//! |----------|----------|---------|
//! | `gemini` | `POST {base}/models/{model}:generateContent` | `GEMINI_API_KEY` or `GOOGLE_API_KEY`, sent as `x-goog-api-key` |
//! | `openai` | `POST {base}/chat/completions` | `OPENAI_API_KEY` |
//!
//! Every call is bounded by the configured timeout and is not retried; a
//! failed or timed-out call surfaces as [`DocketError::Generation`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{DocketError, Result};
use crate::models::{Generation, TokenUsage};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Produces a completion for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn provider(&self) -> &str;
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<Generation>;
}

fn generation_error(provider: &str, message: impl std::fmt::Display) -> DocketError {
    DocketError::Generation {
        provider: provider.to_string(),
        message: message.to_string(),
    }
}

fn env_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .find(|v| !v.trim().is_empty())
}

fn http_client(provider: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| generation_error(provider, format!("failed to build HTTP client: {}", e)))
}

async fn send_json(provider: &str, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            generation_error(provider, "request timed out")
        } else {
            generation_error(provider, format!("request failed: {}", e.without_url()))
        }
    })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(generation_error(
            provider,
            format!("API error {}: {}", status, body.trim()),
        ));
    }

    resp.json()
        .await
        .map_err(|e| generation_error(provider, format!("invalid response body: {}", e)))
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = env_key(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]).ok_or_else(|| {
            DocketError::Config(
                "GEMINI_API_KEY (or GOOGLE_API_KEY) must be set for the gemini provider".into(),
            )
        })?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: http_client("gemini", config.timeout_secs)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
}

fn parse_gemini_response(value: serde_json::Value) -> Result<Generation> {
    let response: GeminiResponse = serde_json::from_value(value)
        .map_err(|e| generation_error("gemini", format!("unexpected response shape: {}", e)))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| generation_error("gemini", "no candidates returned"))?;

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(Generation {
        content,
        usage: response.usage_metadata.map(|u| TokenUsage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
        }),
    })
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "calling gemini");
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let value = send_json("gemini", request).await?;
        parse_gemini_response(value)
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = env_key(&["OPENAI_API_KEY"]).ok_or_else(|| {
            DocketError::Config("OPENAI_API_KEY must be set for the openai provider".into())
        })?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: http_client("openai", config.timeout_secs)?,
        })
    }
}

fn parse_openai_response(value: serde_json::Value) -> Result<Generation> {
    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| generation_error("openai", "response has no message content"))?
        .to_string();

    let usage = value.get("usage").map(|u| TokenUsage {
        input_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        output_tokens: u
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    });

    Ok(Generation { content, usage })
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "calling openai");
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let value = send_json("openai", request).await?;
        parse_openai_response(value)
    }
}

/// Create a generator from configuration.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => Err(DocketError::Config(format!(
            "Unknown llm provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_gemini_text_and_usage() {
        let value = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "The rent is " }, { "text": "$1,000." }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 812, "candidatesTokenCount": 9, "totalTokenCount": 821 }
        });
        let gen = parse_gemini_response(value).unwrap();
        assert_eq!(gen.content, "The rent is $1,000.");
        assert_eq!(
            gen.usage,
            Some(TokenUsage {
                input_tokens: 812,
                output_tokens: 9
            })
        );
    }

    #[test]
    fn test_gemini_without_candidates_is_generation_error() {
        let err = parse_gemini_response(json!({ "candidates": [] })).unwrap_err();
        assert!(matches!(err, DocketError::Generation { .. }));
    }

    #[test]
    fn test_gemini_usage_is_optional() {
        let value = json!({ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] });
        let gen = parse_gemini_response(value).unwrap();
        assert_eq!(gen.content, "ok");
        assert!(gen.usage.is_none());
    }

    #[test]
    fn test_parses_openai_chat_completion() {
        let value = json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "I don't know." } }],
            "usage": { "prompt_tokens": 100, "completion_tokens": 4, "total_tokens": 104 }
        });
        let gen = parse_openai_response(value).unwrap();
        assert_eq!(gen.content, "I don't know.");
        assert_eq!(gen.usage.map(|u| u.total()), Some(104));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        };
        assert!(matches!(
            create_generator(&config),
            Err(DocketError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        let generator = OpenAIGenerator {
            model: "m".into(),
            temperature: 0.3,
            base_url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            client: http_client("openai", 2).unwrap(),
        };
        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, DocketError::Generation { ref provider, .. } if provider == "openai"));
    }

    #[tokio::test]
    async fn test_gemini_key_stays_out_of_error_text() {
        let generator = GeminiGenerator {
            model: "gemini-1.5-pro".into(),
            temperature: 0.3,
            base_url: "http://127.0.0.1:9".into(),
            api_key: "SECRET-GEMINI-KEY".into(),
            client: http_client("gemini", 2).unwrap(),
        };
        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, DocketError::Generation { ref provider, .. } if provider == "gemini"));
        assert!(!err.to_string().contains("SECRET-GEMINI-KEY"));
        assert!(!err.user_message().contains("SECRET-GEMINI-KEY"));
        assert!(err.user_message().contains("could not be reached"));
    }
}
