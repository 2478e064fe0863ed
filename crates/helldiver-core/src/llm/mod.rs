//! Text-generation collaborators.
//!
//! The core only needs "generate(instructions, prompt) -> text" and a remote
//! batch service for the parallel workers. [`AnthropicClient`] provides both.

mod anthropic;

pub use anthropic::{AnthropicClient, AnthropicConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Role instructions, sent as the system prompt.
    pub instructions: String,
    pub prompt: String,
    /// Large, stable context sent ahead of the prompt and marked cacheable.
    pub cached_context: Option<String>,
    /// Model override. `None` uses the client default.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub web_search: bool,
}

impl GenerationRequest {
    pub fn new(instructions: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            prompt: prompt.into(),
            cached_context: None,
            model: None,
            max_tokens: 2000,
            temperature: 0.3,
            web_search: false,
        }
    }

    pub fn with_cached_context(mut self, context: impl Into<String>) -> Self {
        self.cached_context = Some(context.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

/// Single-shot text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns non-empty text or an error. An empty completion is `LlmError::EmptyResponse`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// One request inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub request: GenerationRequest,
}

/// Progress of a submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub ended: bool,
    /// The batch was cancelled remotely.
    pub canceled: bool,
    pub processing: u32,
    pub succeeded: u32,
    pub errored: u32,
}

/// Result for one request of an ended batch. `text` is `None` when it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub custom_id: String,
    pub text: Option<String>,
}

/// Remote asynchronous batch execution.
#[async_trait]
pub trait BatchService: Send + Sync {
    /// Submit requests and return the batch id.
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, LlmError>;

    async fn status(&self, batch_id: &str) -> Result<BatchStatus, LlmError>;

    async fn results(&self, batch_id: &str) -> Result<Vec<BatchOutcome>, LlmError>;

    async fn cancel(&self, batch_id: &str) -> Result<(), LlmError>;
}
