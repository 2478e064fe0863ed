//! Research execution: parallel workers, critical review, narrative synthesis.
//!
//! ```text
//! submit batch (one request per worker)
//!   │
//!   ├─► poll until ended  ◄── cancel token aborts and cancels the batch
//!   │
//!   ├─► collect worker texts (failed workers become empty artifacts)
//!   │
//!   ├─► critical review (one direct call over all findings)
//!   │
//!   └─► narrative synthesis
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::llm::{BatchRequest, BatchService, BatchStatus, GenerationRequest, TextGenerator};
use crate::prompts::{self, render};
use crate::types::{ResearchFindings, WorkerFinding, WorkerSpec, default_roster};

/// Settings for one research executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_roster")]
    pub roster: Vec<WorkerSpec>,

    #[serde(default = "default_worker_model")]
    pub worker_model: String,

    #[serde(default = "default_worker_max_tokens")]
    pub worker_max_tokens: u32,

    #[serde(default = "default_critic_model")]
    pub critic_model: String,

    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

fn default_worker_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_worker_max_tokens() -> u32 {
    4000
}

fn default_critic_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_synthesis_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_progress_interval_secs() -> u64 {
    30
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            roster: default_roster(),
            worker_model: default_worker_model(),
            worker_max_tokens: default_worker_max_tokens(),
            critic_model: default_critic_model(),
            synthesis_model: default_synthesis_model(),
            poll_interval_secs: default_poll_interval_secs(),
            progress_interval_secs: default_progress_interval_secs(),
        }
    }
}

/// Milestones reported while research runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchProgress {
    Submitted { batch_id: String },
    Waiting { elapsed: Duration, status: BatchStatus },
    Collected { succeeded: usize, missing: Vec<String> },
    Reviewing,
    Synthesizing,
}

pub struct ResearchExecutor {
    generator: Arc<dyn TextGenerator>,
    batches: Arc<dyn BatchService>,
    config: ResearchConfig,
    poll_interval: Duration,
    progress_interval: Duration,
}

impl ResearchExecutor {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        batches: Arc<dyn BatchService>,
        config: ResearchConfig,
    ) -> Self {
        let poll_interval = Duration::from_secs(config.poll_interval_secs);
        let progress_interval = Duration::from_secs(config.progress_interval_secs);
        Self {
            generator,
            batches,
            config,
            poll_interval,
            progress_interval,
        }
    }

    /// Override the polling cadence (sub-second intervals, mostly for tests).
    pub fn with_intervals(mut self, poll: Duration, progress: Duration) -> Self {
        self.poll_interval = poll;
        self.progress_interval = progress;
        self
    }

    pub fn roster(&self) -> &[WorkerSpec] {
        &self.config.roster
    }

    /// Submit + collect in one call.
    pub async fn execute(
        &self,
        query: &str,
        context: &str,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(ResearchProgress) + Send),
    ) -> Result<ResearchFindings> {
        let batch_id = self.submit(query, context).await?;
        progress(ResearchProgress::Submitted {
            batch_id: batch_id.clone(),
        });
        self.collect(&batch_id, query, context, cancel, progress).await
    }

    /// Submit one batch request per roster worker and return the batch id.
    pub async fn submit(&self, query: &str, context: &str) -> Result<String> {
        let prompt = render(prompts::WORKER_MESSAGE, &[("query", query), ("context", context)]);
        let requests = self
            .config
            .roster
            .iter()
            .map(|worker| BatchRequest {
                custom_id: worker.id.clone(),
                request: GenerationRequest::new(&worker.instructions, &prompt)
                    .with_model(&self.config.worker_model)
                    .with_max_tokens(self.config.worker_max_tokens)
                    .with_web_search(),
            })
            .collect();

        let batch_id = self.batches.submit(requests).await?;
        info!(batch_id = %batch_id, workers = self.config.roster.len(), "Research batch submitted");
        Ok(batch_id)
    }

    /// Wait for a submitted batch, then review and synthesize its results.
    pub async fn collect(
        &self,
        batch_id: &str,
        query: &str,
        context: &str,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(ResearchProgress) + Send),
    ) -> Result<ResearchFindings> {
        self.wait_for_batch(batch_id, cancel, progress).await?;

        let workers = self.worker_findings(batch_id).await?;
        let missing: Vec<String> = workers
            .iter()
            .filter(|w| w.is_empty())
            .map(|w| w.worker_id.clone())
            .collect();
        progress(ResearchProgress::Collected {
            succeeded: workers.len() - missing.len(),
            missing,
        });

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        progress(ResearchProgress::Reviewing);
        let critique = self.review(query, context, &workers).await;

        progress(ResearchProgress::Synthesizing);
        let narrative = self.synthesize(query, context, &workers, &critique).await;

        Ok(ResearchFindings {
            workers,
            critique,
            narrative,
        })
    }

    /// Ask for a short, searchable cycle name. Falls back to the query itself.
    pub async fn suggest_episode_name(&self, query: &str) -> String {
        let request = GenerationRequest::new(
            "You name research episodes.",
            render(prompts::EPISODE_NAME, &[("query", query)]),
        )
        .with_model(&self.config.critic_model)
        .with_max_tokens(50);

        match self.generator.generate(&request).await {
            Ok(text) => {
                let name = clean_name(&text);
                if name.is_empty() { fallback_name(query) } else { name }
            }
            Err(e) => {
                warn!("Episode name suggestion failed: {}", e);
                fallback_name(query)
            }
        }
    }

    async fn wait_for_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(ResearchProgress) + Send),
    ) -> Result<()> {
        let started = Instant::now();
        let mut last_report: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(batch_id).await);
            }

            match self.batches.status(batch_id).await {
                Ok(status) if status.ended => {
                    info!(
                        batch_id = %batch_id,
                        succeeded = status.succeeded,
                        errored = status.errored,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Research batch ended"
                    );
                    return Ok(());
                }
                Ok(status) if status.canceled => {
                    return Err(Error::Batch {
                        batch_id: batch_id.to_string(),
                        reason: "batch was cancelled remotely".into(),
                    });
                }
                Ok(status) => {
                    let due = last_report.is_none_or(|t| t.elapsed() >= self.progress_interval);
                    if due {
                        progress(ResearchProgress::Waiting {
                            elapsed: started.elapsed(),
                            status,
                        });
                        last_report = Some(Instant::now());
                    }
                }
                Err(e) if e.is_rate_limited() => {
                    debug!(batch_id = %batch_id, "Status poll rate limited: {}", e);
                }
                Err(e) => return Err(e.into()),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(self.abort(batch_id).await),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn abort(&self, batch_id: &str) -> Error {
        warn!(batch_id = %batch_id, "Research cancelled, cancelling batch");
        if let Err(e) = self.batches.cancel(batch_id).await {
            warn!(batch_id = %batch_id, "Batch cancel failed: {}", e);
        }
        Error::Cancelled
    }

    async fn worker_findings(&self, batch_id: &str) -> Result<Vec<WorkerFinding>> {
        let outcomes = self.batches.results(batch_id).await?;

        Ok(self
            .config
            .roster
            .iter()
            .map(|worker| {
                let text = outcomes
                    .iter()
                    .find(|o| o.custom_id == worker.id)
                    .and_then(|o| o.text.clone())
                    .unwrap_or_default();
                if text.trim().is_empty() {
                    warn!(worker = %worker.id, "Worker produced no findings");
                } else {
                    debug!(worker = %worker.id, chars = text.len(), "Worker findings collected");
                }
                WorkerFinding::new(worker, text)
            })
            .collect())
    }

    async fn review(&self, query: &str, context: &str, workers: &[WorkerFinding]) -> String {
        if workers.iter().all(|w| w.is_empty()) {
            warn!("No worker findings to review");
            return String::new();
        }

        let findings = format_findings(workers);
        let request = GenerationRequest::new(
            prompts::CRITICAL_ANALYST,
            render(
                prompts::CRITIQUE_MESSAGE,
                &[("query", query), ("context", context), ("findings", findings.as_str())],
            ),
        )
        .with_model(&self.config.critic_model);

        match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Critical review failed: {}", e);
                String::new()
            }
        }
    }

    async fn synthesize(
        &self,
        query: &str,
        context: &str,
        workers: &[WorkerFinding],
        critique: &str,
    ) -> String {
        if workers.iter().all(|w| w.is_empty()) {
            return String::new();
        }

        let mut material = format_findings(workers);
        if !critique.trim().is_empty() {
            material.push_str(&format!("=== CRITICAL ANALYSIS ===\n{}\n\n", critique));
        }

        let request = GenerationRequest::new(
            prompts::SYNTHESIZER,
            render(prompts::SYNTHESIS_MESSAGE, &[("query", query), ("context", context)]),
        )
        .with_cached_context(material)
        .with_model(&self.config.synthesis_model)
        .with_temperature(0.4);

        match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Narrative synthesis failed: {}", e);
                String::new()
            }
        }
    }
}

/// Worker findings as labelled sections, skipping empty ones.
pub fn format_findings(workers: &[WorkerFinding]) -> String {
    workers
        .iter()
        .filter(|w| !w.is_empty())
        .map(|w| format!("=== {} ===\n{}\n\n", w.label.to_uppercase(), w.text))
        .collect()
}

fn clean_name(text: &str) -> String {
    text.lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn fallback_name(query: &str) -> String {
    query.split_whitespace().take(8).collect::<Vec<_>>().join(" ")
}
