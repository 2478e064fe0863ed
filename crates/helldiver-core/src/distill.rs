//! Conversation distillation for graph ingestion.
//!
//! Distillation runs once per cycle, at commit time, over the whole
//! transcript gathered since the previous cycle.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts::{self, render};
use crate::types::{ChatMessage, ChatRole, RefinementTurn};

/// Text committed when there was no conversation to distill.
pub const NO_REFINEMENT: &str = "(No refinement conversation - research triggered immediately)";

pub struct Distiller {
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl Distiller {
    pub fn new(generator: Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    /// Compress `turns` into extraction-friendly prose. Never returns an empty string.
    pub async fn distill(&self, turns: &[RefinementTurn]) -> String {
        if turns.is_empty() {
            return NO_REFINEMENT.to_string();
        }

        let conversation = turns
            .iter()
            .map(|t| format!("USER: {}\n\nASSISTANT: {}", t.user_input, t.assistant_response))
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = GenerationRequest::new(
            prompts::DISTILLER,
            render(prompts::DISTILL_MESSAGE, &[("conversation", conversation.as_str())]),
        )
        .with_model(&self.model)
        .with_max_tokens(2000);

        match self.generator.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(turns = turns.len(), chars = text.len(), "Conversation distilled");
                text
            }
            Ok(_) => {
                warn!("Distillation returned nothing, keeping raw transcript");
                conversation
            }
            Err(e) => {
                warn!("Distillation failed ({}), keeping raw transcript", e);
                conversation
            }
        }
    }
}

/// Pair a role/content tasking transcript into user turns.
///
/// Each user message is paired with the assistant message before it, so an
/// assistant-first transcript (clarifying questions, then answers) keeps the
/// question attached to its answer. A trailing assistant message is dropped.
pub fn turns_from_tasking(history: &[ChatMessage]) -> Vec<RefinementTurn> {
    let mut turns = Vec::new();
    let mut pending_assistant: Option<&str> = None;

    for message in history {
        match message.role {
            ChatRole::Assistant => pending_assistant = Some(&message.content),
            ChatRole::User => {
                turns.push(RefinementTurn::new(
                    message.content.clone(),
                    pending_assistant.take().unwrap_or_default(),
                ));
            }
        }
    }

    turns
}

/// Human-readable transcript for the audit files.
pub fn format_transcript(turns: &[RefinementTurn]) -> String {
    if turns.is_empty() {
        return "(No refinement conversation)\n".to_string();
    }

    turns
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "--- Turn {} ({}) ---\nUSER: {}\n\nASSISTANT: {}\n\n",
                i + 1,
                t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                t.user_input,
                t.assistant_response
            )
        })
        .collect()
}
