//! The interactive research loop shared by `run` and `resume`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use dialoguer::Input;
use helldiver_core::artifacts::dir_name;
use helldiver_core::distill::Distiller;
use helldiver_core::graph::{ConnectionManager, EpisodeCommitter, Neo4jConnector};
use helldiver_core::intent::{IntentClassifier, LlmIntentClassifier, RefinementIntent, TaskingIntent};
use helldiver_core::llm::{AnthropicClient, GenerationRequest, TextGenerator};
use helldiver_core::prompts::{self, render};
use helldiver_core::research::{ResearchExecutor, ResearchProgress, format_findings};
use helldiver_core::types::{ChatMessage, ChatRole};
use helldiver_core::{CycleReport, CycleRunner, JsonSessionStore, Session, SessionState};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CliError;

/// How a refinement loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Done,
    NewSession,
}

/// Wires the LLM client, classifier and cycle runner together.
pub struct Agent {
    chat: Arc<AnthropicClient>,
    chat_model: String,
    classifier: Box<dyn IntentClassifier>,
    runner: CycleRunner,
}

impl Agent {
    pub fn new(config: &Config) -> Result<Self> {
        if !config.has_api_key() {
            return Err(CliError::MissingApiKey.into());
        }

        let client = Arc::new(
            AnthropicClient::new(config.llm.anthropic.clone())
                .context("Failed to create LLM client")?,
        );

        let executor = ResearchExecutor::new(client.clone(), client.clone(), config.research.clone());
        let distiller = Distiller::new(client.clone(), &config.llm.distill_model);
        let committer = EpisodeCommitter::new(
            ConnectionManager::new(Box::new(Neo4jConnector::new(config.graph.neo4j.clone()))),
            config.retry.clone(),
        );
        let runner = CycleRunner::new(
            executor,
            distiller,
            committer,
            Box::new(JsonSessionStore::new()),
            &config.graph.group_id,
        );
        let classifier = Box::new(LlmIntentClassifier::new(
            client.clone(),
            &config.llm.intent_model,
        ));

        Ok(Self {
            chat: client,
            chat_model: config.llm.chat_model.clone(),
            classifier,
            runner,
        })
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        self.runner.save(session).context("Failed to save session")
    }

    /// Clarify the query until the user is ready, then move to RESEARCH.
    pub async fn tasking(&mut self, session: &mut Session) -> Result<()> {
        println!();
        println!("{}", "TASKING".cyan().bold());
        println!("{}", "─".repeat(50));

        session.add_tasking_message(ChatMessage::user(session.query.clone()));
        let opening = self
            .chat(prompts::TASKING_MENTOR, format!("Research query: {}", session.query))
            .await
            .unwrap_or_else(|e| {
                warn!("Clarifying questions failed: {}", e);
                "What aspect of this matters most to you?".to_string()
            });
        println!("\n{}\n", opening);
        session.add_tasking_message(ChatMessage::assistant(opening));
        self.save(session)?;

        loop {
            let input = read_line("You (say 'go' when ready)")?;
            if input.is_empty() {
                continue;
            }

            session.add_tasking_message(ChatMessage::user(input.clone()));
            self.save(session)?;

            if self.classifier.tasking(&input).await? == TaskingIntent::Proceed {
                break;
            }

            let reply = self
                .chat(prompts::TASKING_MENTOR, conversation_text(&session.tasking_history))
                .await
                .context("Tasking conversation failed")?;
            println!("\n{}\n", reply);
            session.add_tasking_message(ChatMessage::assistant(reply));
            self.save(session)?;
        }

        let conversation = conversation_text(&session.tasking_history);
        session.tasking_summary = match self
            .chat(
                "You summarize research requests.",
                render(prompts::TASKING_SUMMARY, &[("conversation", conversation.as_str())]),
            )
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Tasking summary failed ({}), using the transcript", e);
                conversation
            }
        };

        session.transition(SessionState::Research)?;
        self.save(session)
    }

    /// Run one research cycle. Returns `false` when the user cancelled it.
    pub async fn research(&mut self, session: &mut Session, query: &str, context: &str) -> Result<bool> {
        let suggested = match session.pending_batch.as_ref().filter(|b| b.query == query) {
            Some(batch) => batch.cycle_name.clone(),
            None => self.runner.executor().suggest_episode_name(query).await,
        };
        let cycle_name: String = Input::new()
            .with_prompt("Episode name")
            .default(suggested)
            .interact_text()
            .map_err(CliError::from)?;

        println!();
        println!("{} {}", "RESEARCH".cyan().bold(), cycle_name.bold());
        println!("{}", "Press Ctrl-C to cancel.".dimmed());

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        let bar = spinner.clone();
        let mut on_progress = move |event: ResearchProgress| bar.set_message(progress_message(&event));

        let result = self
            .runner
            .run(session, &cycle_name, query, context, &cancel, &mut on_progress)
            .await;
        ctrl_c.abort();
        spinner.finish_and_clear();

        match result {
            Ok(report) => {
                print_narrative(session);
                print_report(&report);
                Ok(true)
            }
            Err(e) if e.is_cancelled() => {
                println!("{}", "Research cancelled.".yellow());
                let next = if session.cycle_count > 0 {
                    SessionState::Refinement
                } else {
                    SessionState::Complete
                };
                session.transition(next)?;
                self.save(session)?;
                Ok(false)
            }
            Err(e) if session.cycle_count > 0 => {
                println!("{}", format!("✗ Research failed: {}", e).red());
                session.abandon_batch();
                session.transition(SessionState::Refinement)?;
                self.save(session)?;
                Ok(false)
            }
            Err(e) => Err(e).context("Research failed"),
        }
    }

    /// Talk about the findings until the user commits, researches further or exits.
    pub async fn refinement(&mut self, session: &mut Session) -> Result<LoopOutcome> {
        println!();
        println!("{}", "REFINEMENT".cyan().bold());
        print_actions();

        loop {
            let input = read_line("You")?;
            if input.is_empty() {
                continue;
            }

            let intent = self.classifier.refinement(&input).await?;
            debug!(intent = %intent, "Refinement intent");

            match intent {
                RefinementIntent::Exit => {
                    session.transition(SessionState::Complete)?;
                    self.save(session)?;
                    println!("{}", format!("Session saved to {}", session.dir().display()).dimmed());
                    return Ok(LoopOutcome::Done);
                }
                RefinementIntent::Commit => {
                    if let Some(outcome) = self.commit(session).await? {
                        return Ok(outcome);
                    }
                }
                RefinementIntent::DeepResearch => {
                    self.deep_research(session, &input).await?;
                }
                RefinementIntent::Question => {
                    self.answer(session, &input).await?;
                }
                RefinementIntent::Unclear => print_actions(),
            }
        }
    }

    /// Commit pending refinement. `None` means the commit failed and the loop continues.
    async fn commit(&mut self, session: &mut Session) -> Result<Option<LoopOutcome>> {
        session.transition(SessionState::Commit)?;
        self.save(session)?;

        let committed = match self.runner.commit_refinement(session).await? {
            Some(report) => {
                print_report(&report);
                report.commit.is_success()
            }
            None => {
                if session.committed_cycles.iter().any(|c| c == &session.cycle_name) {
                    println!("{}", "Nothing new to commit; the research is already in the graph.".dimmed());
                } else {
                    println!(
                        "{}",
                        "Nothing new to commit. The last cycle was not committed; retry with `helldiver commit`."
                            .yellow()
                    );
                }
                true
            }
        };

        if !committed {
            session.transition(SessionState::Refinement)?;
            self.save(session)?;
            return Ok(None);
        }

        let answer = read_line("Start a new research session? (yes/no)")?;
        let again = self
            .classifier
            .confirm(&answer, "start a new research session")
            .await?;

        session.transition(SessionState::Complete)?;
        self.save(session)?;

        Ok(Some(if again.is_yes() {
            LoopOutcome::NewSession
        } else {
            LoopOutcome::Done
        }))
    }

    async fn deep_research(&mut self, session: &mut Session, input: &str) -> Result<()> {
        let recent = recent_turns(session, 4);
        let topic = self.classifier.research_topic(input, &recent).await?;

        println!("Deep research on: {}", topic.bold());
        let answer = read_line("Proceed? (yes/no)")?;
        let confirm = self
            .classifier
            .confirm(&answer, &format!("run deep research on {}", topic))
            .await?;
        if !confirm.is_yes() {
            println!("{}", "Staying in refinement.".dimmed());
            return Ok(());
        }

        session.add_refinement_turn(input, format!("Starting deep research on: {}", topic));
        session.transition(SessionState::Research)?;
        self.save(session)?;

        let context = research_brief(session);
        self.research(session, &topic, &context).await?;
        Ok(())
    }

    async fn answer(&mut self, session: &mut Session, input: &str) -> Result<()> {
        let mut prompt = recent_turns(session, 4).join("\n\n");
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("USER: {}", input));

        let request = GenerationRequest::new(prompts::REFINEMENT_ASSISTANT, prompt)
            .with_cached_context(research_context(session))
            .with_model(&self.chat_model);

        match self.chat.generate(&request).await {
            Ok(reply) => {
                println!("\n{}\n", reply);
                session.add_refinement_turn(input, reply);
                self.save(session)?;
            }
            Err(e) => println!("{}", format!("✗ {}", e).red()),
        }
        Ok(())
    }

    async fn chat(&self, instructions: &str, prompt: String) -> Result<String> {
        let request = GenerationRequest::new(instructions, prompt).with_model(&self.chat_model);
        Ok(self.chat.generate(&request).await?)
    }
}

/// New session directory under `sessions_dir`, named by time and query.
pub fn new_session_dir(sessions_dir: &Path, query: &str) -> PathBuf {
    let words: Vec<&str> = query.split_whitespace().take(6).collect();
    let slug: String = dir_name(&words.join(" "))
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    sessions_dir.join(format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), slug))
}

pub fn read_line(label: &str) -> Result<String> {
    let line: String = Input::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()
        .map_err(CliError::from)?;
    Ok(line.trim().to_string())
}

fn conversation_text(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::User => "USER",
                ChatRole::Assistant => "ASSISTANT",
            };
            format!("{}: {}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn recent_turns(session: &Session, n: usize) -> Vec<String> {
    let turns = &session.pending_refinement;
    turns[turns.len().saturating_sub(n)..]
        .iter()
        .map(|t| format!("USER: {}\nASSISTANT: {}", t.user_input, t.assistant_response))
        .collect()
}

/// All loaded research, sent as cached context for refinement answers.
fn research_context(session: &Session) -> String {
    let mut context = format!("RESEARCH QUERY: {}\n\n", session.query);
    if !session.narrative.is_empty() {
        context.push_str(&format!("=== NARRATIVE ===\n{}\n\n", session.narrative));
    }
    if let Some(findings) = &session.findings {
        context.push_str(&format_findings(&findings.workers));
        if !findings.critique.is_empty() {
            context.push_str(&format!("=== CRITICAL ANALYSIS ===\n{}\n\n", findings.critique));
        }
    }
    context
}

/// Context handed to the workers of a deep-research cycle.
fn research_brief(session: &Session) -> String {
    let mut brief = format!("Original question: {}\n", session.original_query);
    if !session.tasking_summary.is_empty() {
        brief.push_str(&format!("Tasking: {}\n", session.tasking_summary));
    }
    let recent = recent_turns(session, 4);
    if !recent.is_empty() {
        brief.push_str(&format!("Recent discussion:\n{}\n", recent.join("\n\n")));
    }
    brief
}

fn progress_message(event: &ResearchProgress) -> String {
    match event {
        ResearchProgress::Submitted { batch_id } => format!("Workers dispatched (batch {})", batch_id),
        ResearchProgress::Waiting { elapsed, status } => format!(
            "Researching... {}s elapsed, {} processing, {} done",
            elapsed.as_secs(),
            status.processing,
            status.succeeded + status.errored
        ),
        ResearchProgress::Collected { succeeded, missing } if missing.is_empty() => {
            format!("{} workers reported", succeeded)
        }
        ResearchProgress::Collected { succeeded, missing } => {
            format!("{} workers reported, no findings from {}", succeeded, missing.join(", "))
        }
        ResearchProgress::Reviewing => "Critical review...".to_string(),
        ResearchProgress::Synthesizing => "Synthesizing narrative...".to_string(),
    }
}

fn print_narrative(session: &Session) {
    if session.narrative.is_empty() {
        return;
    }
    println!();
    println!("{}", "NARRATIVE".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("{}", session.narrative);
}

pub fn print_report(report: &CycleReport) {
    let commit = &report.commit;
    println!();
    if let Some(reason) = &commit.unavailable {
        println!("{}", format!("✗ Graph commit skipped: {}", reason).red());
        println!(
            "  Artifacts saved in {}. Retry with: helldiver commit {}",
            report.cycle_dir.display(),
            report.cycle_dir.display()
        );
        return;
    }

    for name in &commit.episodes {
        println!("  {} {}", "✓".green(), name);
    }
    for error in &commit.errors {
        println!("  {} {}", "✗".red(), error.message);
    }
    let summary = format!("{} episode(s) committed", commit.episode_count);
    if commit.errors.is_empty() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", format!("{}, {} failed", summary, commit.errors.len()).yellow().bold());
    }
}

fn print_actions() {
    println!(
        "{}",
        "Ask a question, request deep research on a topic, say 'commit' to save to the graph, or 'exit'."
            .dimmed()
    );
}
