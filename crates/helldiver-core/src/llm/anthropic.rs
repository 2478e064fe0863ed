//! Anthropic Messages and Message Batches API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{BatchOutcome, BatchRequest, BatchService, BatchStatus, GenerationRequest, TextGenerator};
use crate::error::LlmError;

const API_VERSION: &str = "2023-06-01";

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used when a request does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Authentication);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
        let response = self.authed(builder).send().await?;
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            401 | 403 => LlmError::Authentication,
            // 529 is Anthropic's "overloaded"; treat it like 429.
            429 | 529 => LlmError::RateLimited(message),
            status => LlmError::Api { status, message },
        })
    }
}

/// Build the JSON params of a Messages API call.
fn message_params(request: &GenerationRequest, default_model: &str) -> Value {
    let content = match &request.cached_context {
        Some(context) => json!([
            { "type": "text", "text": context, "cache_control": { "type": "ephemeral" } },
            { "type": "text", "text": request.prompt },
        ]),
        None => json!(request.prompt),
    };

    let mut params = json!({
        "model": request.model.as_deref().unwrap_or(default_model),
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "system": request.instructions,
        "messages": [{ "role": "user", "content": content }],
    });

    if request.web_search {
        params["tools"] = json!([{ "type": "web_search_20250305", "name": "web_search" }]);
    }
    params
}

/// Concatenate the text blocks of a message. Tool-use blocks are skipped.
fn message_text(message: &Value) -> Result<String, LlmError> {
    let blocks = message["content"]
        .as_array()
        .ok_or_else(|| LlmError::Malformed("message has no content array".into()))?;

    let text = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.trim().is_empty() {
        Err(LlmError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    processing_status: String,
    #[serde(default)]
    request_counts: RequestCounts,
}

#[derive(Debug, Default, Deserialize)]
struct RequestCounts {
    #[serde(default)]
    processing: u32,
    #[serde(default)]
    succeeded: u32,
    #[serde(default)]
    errored: u32,
    #[serde(default)]
    canceled: u32,
    #[serde(default)]
    expired: u32,
}

impl From<BatchObject> for BatchStatus {
    fn from(batch: BatchObject) -> Self {
        let counts = batch.request_counts;
        BatchStatus {
            ended: batch.processing_status == "ended",
            canceled: batch.processing_status == "canceling" || counts.canceled > 0,
            processing: counts.processing,
            succeeded: counts.succeeded,
            errored: counts.errored + counts.expired,
        }
    }
}

/// Parse the JSONL results stream of an ended batch.
fn parse_batch_results(body: &str) -> Result<Vec<BatchOutcome>, LlmError> {
    let mut outcomes = Vec::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let entry: Value =
            serde_json::from_str(line).map_err(|e| LlmError::Malformed(e.to_string()))?;
        let custom_id = entry["custom_id"]
            .as_str()
            .ok_or_else(|| LlmError::Malformed("result without custom_id".into()))?
            .to_string();

        let text = if entry["result"]["type"] == "succeeded" {
            message_text(&entry["result"]["message"]).ok()
        } else {
            debug!(custom_id = %custom_id, result = %entry["result"], "Batch request did not succeed");
            None
        };
        outcomes.push(BatchOutcome { custom_id, text });
    }
    Ok(outcomes)
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let params = message_params(request, &self.config.default_model);
        debug!(model = %params["model"], "Sending message");

        let response = self.send(self.http.post(self.url("messages")).json(&params)).await?;
        let message: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        message_text(&message)
    }
}

#[async_trait]
impl BatchService for AnthropicClient {
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, LlmError> {
        let requests: Vec<Value> = requests
            .iter()
            .map(|r| {
                json!({
                    "custom_id": r.custom_id,
                    "params": message_params(&r.request, &self.config.default_model),
                })
            })
            .collect();

        let response = self
            .send(
                self.http
                    .post(self.url("messages/batches"))
                    .json(&json!({ "requests": requests })),
            )
            .await?;
        let batch: BatchObject = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        debug!(batch_id = %batch.id, "Batch submitted");
        Ok(batch.id)
    }

    async fn status(&self, batch_id: &str) -> Result<BatchStatus, LlmError> {
        let response = self
            .send(self.http.get(self.url(&format!("messages/batches/{}", batch_id))))
            .await?;
        let batch: BatchObject = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        Ok(batch.into())
    }

    async fn results(&self, batch_id: &str) -> Result<Vec<BatchOutcome>, LlmError> {
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("messages/batches/{}/results", batch_id))),
            )
            .await?;
        let body = response.text().await?;
        parse_batch_results(&body)
    }

    async fn cancel(&self, batch_id: &str) -> Result<(), LlmError> {
        self.send(
            self.http
                .post(self.url(&format!("messages/batches/{}/cancel", batch_id))),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let result = AnthropicClient::new(AnthropicConfig::default());
        assert!(matches!(result, Err(LlmError::Authentication)));
    }

    #[test]
    fn test_message_params_plain() {
        let request = GenerationRequest::new("be terse", "hello").with_max_tokens(100);
        let params = message_params(&request, "claude-sonnet-4-5");

        assert_eq!(params["model"], "claude-sonnet-4-5");
        assert_eq!(params["max_tokens"], 100);
        assert_eq!(params["system"], "be terse");
        assert_eq!(params["messages"][0]["content"], "hello");
        assert!(params.get("tools").is_none());
    }

    #[test]
    fn test_message_params_cached_context_and_tools() {
        let request = GenerationRequest::new("research", "what is new?")
            .with_cached_context("findings...")
            .with_model("claude-opus-4-20250514")
            .with_web_search();
        let params = message_params(&request, "claude-sonnet-4-5");

        assert_eq!(params["model"], "claude-opus-4-20250514");
        let content = &params["messages"][0]["content"];
        assert_eq!(content[0]["cache_control"]["type"], "ephemeral");
        assert_eq!(content[1]["text"], "what is new?");
        assert_eq!(params["tools"][0]["name"], "web_search");
    }

    #[test]
    fn test_message_text_joins_text_blocks() {
        let message = json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "server_tool_use", "name": "web_search" },
                { "type": "text", "text": "second" },
            ]
        });
        assert_eq!(message_text(&message).unwrap(), "first\n\nsecond");
    }

    #[test]
    fn test_message_text_empty() {
        let message = json!({ "content": [{ "type": "text", "text": "  " }] });
        assert!(matches!(message_text(&message), Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn test_parse_batch_results() {
        let body = r#"{"custom_id":"academic_researcher","result":{"type":"succeeded","message":{"content":[{"type":"text","text":"papers"}]}}}
{"custom_id":"tool_analyzer","result":{"type":"errored","error":{"type":"overloaded_error"}}}
"#;
        let outcomes = parse_batch_results(body).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].text.as_deref(), Some("papers"));
        assert_eq!(outcomes[1].custom_id, "tool_analyzer");
        assert!(outcomes[1].text.is_none());
    }

    #[test]
    fn test_batch_status_from_object() {
        let batch: BatchObject = serde_json::from_value(json!({
            "id": "msgbatch_1",
            "processing_status": "ended",
            "request_counts": { "processing": 0, "succeeded": 2, "errored": 1, "canceled": 0, "expired": 0 }
        }))
        .unwrap();
        let status: BatchStatus = batch.into();
        assert!(status.ended);
        assert!(!status.canceled);
        assert_eq!(status.succeeded, 2);
        assert_eq!(status.errored, 1);
    }
}
