//! Intent classification for the interactive loop.
//!
//! Control flow only sees the closed enums below. How they are produced is up
//! to the [`IntentClassifier`] implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts::{self, render};

/// During tasking: start research or keep clarifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskingIntent {
    Proceed,
    Continue,
}

/// During refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementIntent {
    Exit,
    Commit,
    DeepResearch,
    Question,
    Unclear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
}

impl fmt::Display for RefinementIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exit => "EXIT",
            Self::Commit => "COMMIT",
            Self::DeepResearch => "DEEP_RESEARCH",
            Self::Question => "QUESTION",
            Self::Unclear => "UNCLEAR",
        };
        f.write_str(s)
    }
}

impl TaskingIntent {
    pub fn parse(answer: &str) -> Self {
        match first_word(answer).as_str() {
            "PROCEED" => Self::Proceed,
            _ => Self::Continue,
        }
    }
}

impl RefinementIntent {
    pub fn parse(answer: &str) -> Self {
        match first_word(answer).as_str() {
            "EXIT" => Self::Exit,
            "COMMIT" => Self::Commit,
            "DEEP_RESEARCH" => Self::DeepResearch,
            "QUESTION" => Self::Question,
            _ => Self::Unclear,
        }
    }
}

impl Confirmation {
    pub fn parse(answer: &str) -> Self {
        match first_word(answer).as_str() {
            "YES" => Self::Yes,
            _ => Self::No,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

fn first_word(answer: &str) -> String {
    answer
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .to_ascii_uppercase()
}

/// Decides what the user meant at each decision point.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn tasking(&self, input: &str) -> Result<TaskingIntent>;

    async fn refinement(&self, input: &str) -> Result<RefinementIntent>;

    /// `context` describes what is being confirmed.
    async fn confirm(&self, input: &str, context: &str) -> Result<Confirmation>;

    /// Resolve the topic of a deep-research request against recent conversation.
    async fn research_topic(&self, input: &str, recent: &[String]) -> Result<String>;
}

/// Classifier backed by a one-word LLM answer.
pub struct LlmIntentClassifier {
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl LlmIntentClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    async fn ask(&self, prompt: String, max_tokens: u32) -> Result<String> {
        let request = GenerationRequest::new("You classify user intent. Answer tersely.", prompt)
            .with_model(&self.model)
            .with_max_tokens(max_tokens)
            .with_temperature(0.0);
        let answer = self.generator.generate(&request).await?;
        debug!(answer = %answer.trim(), "Intent answer");
        Ok(answer)
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn tasking(&self, input: &str) -> Result<TaskingIntent> {
        let answer = self
            .ask(render(prompts::TASKING_INTENT, &[("input", input)]), 10)
            .await?;
        Ok(TaskingIntent::parse(&answer))
    }

    async fn refinement(&self, input: &str) -> Result<RefinementIntent> {
        let answer = self
            .ask(render(prompts::REFINEMENT_INTENT, &[("input", input)]), 10)
            .await?;
        Ok(RefinementIntent::parse(&answer))
    }

    async fn confirm(&self, input: &str, context: &str) -> Result<Confirmation> {
        let answer = self
            .ask(
                render(prompts::CONFIRMATION_INTENT, &[("input", input), ("context", context)]),
                10,
            )
            .await?;
        Ok(Confirmation::parse(&answer))
    }

    async fn research_topic(&self, input: &str, recent: &[String]) -> Result<String> {
        let recent = if recent.is_empty() {
            String::new()
        } else {
            format!("\nRecent conversation:\n{}\n", recent.join("\n"))
        };
        let answer = self
            .ask(
                render(prompts::TOPIC_EXTRACTION, &[("input", input), ("recent", recent.as_str())]),
                100,
            )
            .await?;

        let topic = answer.trim().trim_matches('"').trim().to_string();
        if topic.is_empty() {
            warn!("No topic extracted, using the raw request");
            return Ok(input.trim().to_string());
        }
        Ok(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGenerator;

    #[test]
    fn test_parse_refinement_answers() {
        assert_eq!(RefinementIntent::parse("COMMIT"), RefinementIntent::Commit);
        assert_eq!(RefinementIntent::parse("deep_research\n"), RefinementIntent::DeepResearch);
        assert_eq!(RefinementIntent::parse("**EXIT**"), RefinementIntent::Exit);
        assert_eq!(RefinementIntent::parse("QUESTION."), RefinementIntent::Question);
        assert_eq!(RefinementIntent::parse("maybe?"), RefinementIntent::Unclear);
        assert_eq!(RefinementIntent::parse(""), RefinementIntent::Unclear);
    }

    #[test]
    fn test_parse_defaults_are_conservative() {
        assert_eq!(TaskingIntent::parse("PROCEED"), TaskingIntent::Proceed);
        assert_eq!(TaskingIntent::parse("I think so"), TaskingIntent::Continue);
        assert_eq!(Confirmation::parse("yes"), Confirmation::Yes);
        assert_eq!(Confirmation::parse("sure"), Confirmation::No);
    }

    #[tokio::test]
    async fn test_llm_classifier() {
        let generator = FakeGenerator::new()
            .reply("Is the user ready", "PROCEED")
            .reply("refinement phase", "DEEP_RESEARCH")
            .reply("Respond with ONLY:", "NO");
        let classifier = LlmIntentClassifier::new(Arc::new(generator), "claude-sonnet-4-5");

        assert_eq!(classifier.tasking("go").await.unwrap(), TaskingIntent::Proceed);
        assert_eq!(
            classifier.refinement("dig into costs").await.unwrap(),
            RefinementIntent::DeepResearch
        );
        assert_eq!(
            classifier.confirm("nah", "start research").await.unwrap(),
            Confirmation::No
        );
    }

    #[tokio::test]
    async fn test_research_topic_uses_recent_turns() {
        let generator = FakeGenerator::new().reply("What specific topic", "\"Graphiti indexing\"");
        let classifier = LlmIntentClassifier::new(Arc::new(generator.clone()), "m");

        let topic = classifier
            .research_topic("research that", &["USER: how does Graphiti index?".to_string()])
            .await
            .unwrap();

        assert_eq!(topic, "Graphiti indexing");
        assert!(generator.calls()[0].prompt.contains("how does Graphiti index?"));
    }
}
