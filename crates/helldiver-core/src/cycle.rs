//! One research cycle end to end.
//!
//! ```text
//! RESEARCH
//!   ├─► submit batch, persist its id          (resumable)
//!   ├─► collect findings, review, synthesize
//!   ├─► distill the conversation once
//!   ├─► write audit files
//!   ├─► commit episodes                       (failures reported, not raised)
//!   └─► update session, save                  → REFINEMENT
//! ```

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifacts::{ArtifactSink, CycleArtifacts};
use crate::distill::{Distiller, format_transcript, turns_from_tasking};
use crate::error::{Error, Result};
use crate::graph::{CommitOutcome, CommitRequest, EpisodeCommitter};
use crate::research::{ResearchExecutor, ResearchProgress};
use crate::session::{PendingBatch, Session, SessionState, SessionStore};
use crate::types::ResearchFindings;

/// What a finished cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_name: String,
    pub cycle_dir: PathBuf,
    pub commit: CommitOutcome,
}

pub struct CycleRunner {
    executor: ResearchExecutor,
    distiller: Distiller,
    committer: EpisodeCommitter,
    store: Box<dyn SessionStore>,
    group_id: String,
}

impl CycleRunner {
    pub fn new(
        executor: ResearchExecutor,
        distiller: Distiller,
        committer: EpisodeCommitter,
        store: Box<dyn SessionStore>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            distiller,
            committer,
            store,
            group_id: group_id.into(),
        }
    }

    pub fn executor(&self) -> &ResearchExecutor {
        &self.executor
    }

    pub fn committer_mut(&mut self) -> &mut EpisodeCommitter {
        &mut self.committer
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        self.store.save(session)
    }

    /// Run research for `query` and commit the cycle.
    ///
    /// The session must be in RESEARCH (or move there from TASKING/REFINEMENT).
    /// On success it is left in REFINEMENT and saved. A graph failure is
    /// reported in the returned [`CycleReport`]; the session still advances.
    pub async fn run(
        &mut self,
        session: &mut Session,
        cycle_name: &str,
        query: &str,
        context: &str,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(ResearchProgress) + Send),
    ) -> Result<CycleReport> {
        if session.state != SessionState::Research {
            session.transition(SessionState::Research)?;
        }
        session.query = query.to_string();
        self.store.save(session)?;

        let sink = ArtifactSink::create(session.cycle_dir(cycle_name))?;

        let reusable = session
            .batch_for(cycle_name, query)
            .map(|batch| batch.batch_id.clone());
        let batch_id = match reusable {
            Some(id) => {
                info!(batch_id = %id, "Resuming research batch");
                id
            }
            None => {
                session.abandon_batch();
                let id = self.executor.submit(query, context).await?;
                session.pending_batch = Some(PendingBatch {
                    batch_id: id.clone(),
                    cycle_name: cycle_name.to_string(),
                    query: query.to_string(),
                });
                self.store.save(session)?;
                id
            }
        };
        progress(ResearchProgress::Submitted {
            batch_id: batch_id.clone(),
        });

        let findings = match self
            .executor
            .collect(&batch_id, query, context, cancel, progress)
            .await
        {
            Ok(findings) => findings,
            Err(e) => {
                if !e.is_resumable() {
                    session.abandon_batch();
                    self.store.save(session)?;
                }
                return Err(e);
            }
        };

        // The first cycle is framed by the tasking conversation; later ones by refinement.
        let turns = if session.cycle_count == 0 {
            turns_from_tasking(&session.tasking_history)
        } else {
            session.pending_refinement.clone()
        };
        let distilled = self.distiller.distill(&turns).await;

        sink.write_cycle(&findings, &format_transcript(&turns), &distilled)?;

        let request = self.request(&session.original_query, cycle_name, &findings, &distilled);
        let commit = self.committer.commit(&request).await;
        report_commit(cycle_name, &commit);

        session.complete_cycle(cycle_name, findings);
        if commit.is_success() {
            session.mark_committed(cycle_name);
        }
        session.transition(SessionState::Refinement)?;
        self.store.save(session)?;

        Ok(CycleReport {
            cycle_name: cycle_name.to_string(),
            cycle_dir: sink.dir().to_path_buf(),
            commit,
        })
    }

    /// Commit the pending refinement conversation on its own.
    ///
    /// Returns `None` when there is nothing new to commit. The pending turns
    /// are cleared only if the episode was written.
    pub async fn commit_refinement(&mut self, session: &mut Session) -> Result<Option<CycleReport>> {
        if session.pending_refinement.is_empty() {
            return Ok(None);
        }

        let cycle_name = format!(
            "{} follow-up {}",
            session.cycle_name,
            Utc::now().format("%Y-%m-%d %H%M")
        );
        let turns = session.pending_refinement.clone();
        let distilled = self.distiller.distill(&turns).await;

        let sink = ArtifactSink::create(session.cycle_dir(&cycle_name))?;
        sink.write_cycle(&ResearchFindings::default(), &format_transcript(&turns), &distilled)?;

        let request = self.request(
            &session.original_query,
            &cycle_name,
            &ResearchFindings::default(),
            &distilled,
        );
        let commit = self.committer.commit(&request).await;
        report_commit(&cycle_name, &commit);

        if commit.is_success() {
            session.clear_refinement();
            session.mark_committed(&cycle_name);
        }
        self.store.save(session)?;

        Ok(Some(CycleReport {
            cycle_name,
            cycle_dir: sink.dir().to_path_buf(),
            commit,
        }))
    }

    fn request(
        &self,
        session_name: &str,
        cycle_name: &str,
        findings: &ResearchFindings,
        distilled: &str,
    ) -> CommitRequest {
        CommitRequest {
            session_name: session_name.to_string(),
            cycle_name: cycle_name.to_string(),
            group_id: self.group_id.clone(),
            workers: findings.workers.clone(),
            critique: findings.critique.clone(),
            refinement: distilled.to_string(),
        }
    }
}

/// Build a commit request from a saved cycle directory.
pub fn saved_cycle_request(
    artifacts: &CycleArtifacts,
    session_name: &str,
    cycle_name: &str,
    group_id: &str,
) -> Result<CommitRequest> {
    let request = CommitRequest {
        session_name: session_name.to_string(),
        cycle_name: cycle_name.to_string(),
        group_id: group_id.to_string(),
        workers: artifacts.findings.workers.clone(),
        critique: artifacts.findings.critique.clone(),
        refinement: artifacts.distilled_refinement.clone(),
    };
    if request.non_empty_artifacts() == 0 {
        return Err(Error::Other(format!("Cycle '{}' has no artifacts to commit", cycle_name)));
    }
    Ok(request)
}

fn report_commit(cycle_name: &str, commit: &CommitOutcome) {
    match (&commit.unavailable, commit.errors.len()) {
        (Some(reason), _) => warn!(cycle = %cycle_name, "Cycle not committed: {}", reason),
        (None, 0) => info!(cycle = %cycle_name, episodes = commit.episode_count, "Cycle committed"),
        (None, failed) => warn!(
            cycle = %cycle_name,
            episodes = commit.episode_count,
            failed,
            "Cycle partially committed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::graph::{CommitStatus, ConnectionManager};
    use crate::llm::GenerationRequest;
    use crate::prompts;
    use crate::research::ResearchConfig;
    use crate::retry::RetryPolicy;
    use crate::session::JsonSessionStore;
    use crate::testing::{FakeBackend, FakeBatches, FakeConnector, FakeGenerator};
    use crate::types::ChatMessage;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        runner: CycleRunner,
        backend: FakeBackend,
        batches: FakeBatches,
        generator: FakeGenerator,
        session: Session,
    }

    fn harness(batches: FakeBatches) -> Harness {
        let temp = TempDir::new().unwrap();
        let generator = FakeGenerator::new()
            .reply("skeptical senior researcher", "Relevance 8/10.")
            .reply("research synthesizer", "Narrative.")
            .reply("knowledge graph ingestion", "User wants production evidence.");
        let backend = FakeBackend::default();

        let executor = ResearchExecutor::new(
            Arc::new(generator.clone()),
            Arc::new(batches.clone()),
            ResearchConfig::default(),
        )
        .with_intervals(Duration::from_millis(1), Duration::ZERO);
        let distiller = Distiller::new(Arc::new(generator.clone()), "m");
        let committer = EpisodeCommitter::new(
            ConnectionManager::new(Box::new(FakeConnector::new(&backend))),
            RetryPolicy::immediate(3),
        );
        let runner = CycleRunner::new(
            executor,
            distiller,
            committer,
            Box::new(JsonSessionStore::new()),
            "helldiver_research",
        );

        let mut session = Session::new(temp.path().join("graph_memory"), "graph memory");
        session.add_tasking_message(ChatMessage::assistant("Which angle?"));
        session.add_tasking_message(ChatMessage::user("Production systems."));

        Harness {
            _temp: temp,
            runner,
            backend,
            batches,
            generator,
            session,
        }
    }

    async fn run_cycle(h: &mut Harness, cycle_name: &str, query: &str) -> Result<CycleReport> {
        h.runner
            .run(&mut h.session, cycle_name, query, "ctx", &CancellationToken::new(), &mut |_| {})
            .await
    }

    fn distill_calls(generator: &FakeGenerator) -> Vec<GenerationRequest> {
        generator
            .calls()
            .into_iter()
            .filter(|r| r.instructions == prompts::DISTILLER)
            .collect()
    }

    fn all_workers() -> FakeBatches {
        FakeBatches::ended_with(&[
            ("academic_researcher", Some("papers")),
            ("industry_intelligence", Some("case studies")),
            ("tool_analyzer", Some("tools")),
        ])
    }

    #[tokio::test]
    async fn test_first_cycle_commits_and_advances() {
        let mut h = harness(all_workers());

        let report = h
            .runner
            .run(&mut h.session, "Agent Memory", "graph memory", "ctx", &CancellationToken::new(), &mut |_| {})
            .await
            .unwrap();

        assert_eq!(report.commit.status, CommitStatus::Success);
        assert_eq!(report.commit.episode_count, 5);
        assert!(report.cycle_dir.join("refinement_distilled.txt").exists());
        assert!(report.cycle_dir.join("academic_researcher.txt").exists());

        assert_eq!(h.session.state, SessionState::Refinement);
        assert_eq!(h.session.cycle_count, 1);
        assert_eq!(h.session.committed_cycles, vec!["Agent Memory".to_string()]);

        let saved = JsonSessionStore::new().load(h.session.dir()).unwrap();
        assert_eq!(saved.state, SessionState::Refinement);
        assert_eq!(saved.narrative, "Narrative.");
        assert!(saved.pending_batch.is_none());
    }

    #[tokio::test]
    async fn test_graph_outage_is_reported_not_raised() {
        let mut h = harness(all_workers());
        h.backend.set_reachable(false);

        let report = h
            .runner
            .run(&mut h.session, "Agent Memory", "q", "c", &CancellationToken::new(), &mut |_| {})
            .await
            .unwrap();

        assert_eq!(report.commit.status, CommitStatus::Error);
        assert_eq!(report.commit.episode_count, 0);
        assert!(report.commit.unavailable.is_some());
        assert_eq!(h.session.state, SessionState::Refinement);
        assert!(h.session.committed_cycles.is_empty());
        assert!(report.cycle_dir.join("critical_analysis.txt").exists());
    }

    #[tokio::test]
    async fn test_pending_batch_is_resumed() {
        let mut h = harness(all_workers());
        h.session.transition(SessionState::Research).unwrap();
        h.session.pending_batch = Some(PendingBatch {
            batch_id: "msgbatch_resumed".into(),
            cycle_name: "Agent Memory".into(),
            query: "q".into(),
        });

        run_cycle(&mut h, "Agent Memory", "q").await.unwrap();

        assert!(h.batches.submitted().is_empty());
        assert_eq!(h.session.cycle_count, 1);
    }

    #[tokio::test]
    async fn test_pending_batch_for_another_topic_is_not_collected() {
        let mut h = harness(all_workers());
        h.session.transition(SessionState::Research).unwrap();
        h.session.pending_batch = Some(PendingBatch {
            batch_id: "msgbatch_old".into(),
            cycle_name: "Old Topic".into(),
            query: "old topic".into(),
        });

        run_cycle(&mut h, "Agent Memory", "q").await.unwrap();

        assert_eq!(h.batches.submitted().len(), 1);
        assert!(h.session.pending_batch.is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_is_not_collected_for_the_next_topic() {
        let mut h = harness(all_workers());
        run_cycle(&mut h, "Topic A", "topic A").await.unwrap();

        h.batches.push_status_error(LlmError::Api {
            status: 500,
            message: "internal error".into(),
        });
        let err = run_cycle(&mut h, "Topic B", "topic B").await.unwrap_err();
        assert!(!err.is_resumable());
        assert!(h.session.pending_batch.is_none());
        let saved = JsonSessionStore::new().load(h.session.dir()).unwrap();
        assert!(saved.pending_batch.is_none());

        h.session.transition(SessionState::Refinement).unwrap();
        h.batches.push_ended();
        run_cycle(&mut h, "Topic C", "topic C").await.unwrap();

        let submitted = h.batches.submitted();
        assert_eq!(submitted.len(), 3);
        assert!(submitted[2][0].request.prompt.contains("topic C"));
        assert_eq!(h.session.cycle_name, "Topic C");
        assert_eq!(h.session.query, "topic C");
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_batch_for_same_cycle() {
        let mut h = harness(all_workers());
        run_cycle(&mut h, "Topic A", "topic A").await.unwrap();

        h.batches
            .push_status_error(LlmError::Transport("connection reset".into()));
        let err = run_cycle(&mut h, "Topic B", "topic B").await.unwrap_err();
        assert!(err.is_resumable());
        let pending = h.session.pending_batch.clone().unwrap();
        assert_eq!(pending.batch_id, "msgbatch_2");
        assert_eq!(pending.cycle_name, "Topic B");

        h.batches.push_ended();
        run_cycle(&mut h, "Topic B", "topic B").await.unwrap();

        assert_eq!(h.batches.submitted().len(), 2);
        assert_eq!(h.session.cycle_count, 2);
    }

    #[tokio::test]
    async fn test_refinement_is_distilled_once_per_cycle() {
        let mut h = harness(all_workers());
        run_cycle(&mut h, "Agent Memory", "graph memory").await.unwrap();
        assert_eq!(distill_calls(&h.generator).len(), 1);

        let calls_before = h.generator.calls().len();
        h.session.add_refinement_turn("what about latency?", "Latency is 40ms.");
        h.session.add_refinement_turn("and cost?", "About $2 per 1k episodes.");
        h.session.add_refinement_turn("focus on Neo4j", "Noted.");
        assert_eq!(h.generator.calls().len(), calls_before);

        h.batches.push_ended();
        run_cycle(&mut h, "Neo4j Costs", "neo4j memory cost").await.unwrap();

        let distills = distill_calls(&h.generator);
        assert_eq!(distills.len(), 2);
        let prompt = &distills[1].prompt;
        assert!(prompt.contains("what about latency?"));
        assert!(prompt.contains("and cost?"));
        assert!(prompt.contains("focus on Neo4j"));
    }

    #[tokio::test]
    async fn test_cancel_leaves_session_in_research() {
        let mut h = harness(FakeBatches::never_ends());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .runner
            .run(&mut h.session, "Agent Memory", "q", "c", &cancel, &mut |_| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(h.session.state, SessionState::Research);
        assert!(h.session.pending_batch.is_none());
        assert_eq!(h.batches.cancelled().len(), 1);
        assert_eq!(h.backend.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_commit_refinement_only() {
        let mut h = harness(all_workers());
        h.runner
            .run(&mut h.session, "Agent Memory", "q", "c", &CancellationToken::new(), &mut |_| {})
            .await
            .unwrap();

        assert!(h.runner.commit_refinement(&mut h.session).await.unwrap().is_none());

        h.session.add_refinement_turn("latency matters most", "Noted.");
        let report = h
            .runner
            .commit_refinement(&mut h.session)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.commit.episode_count, 1);
        assert!(report.commit.episodes[0].ends_with("Refinement Context"));
        assert!(h.session.pending_refinement.is_empty());
        assert_eq!(h.session.committed_cycles.len(), 2);
    }

    #[test]
    fn test_saved_cycle_request_requires_content() {
        let empty = CycleArtifacts::default();
        assert!(saved_cycle_request(&empty, "s", "c", "g").is_err());

        let mut artifacts = CycleArtifacts::default();
        artifacts.findings.critique = "critique".into();
        let request = saved_cycle_request(&artifacts, "s", "c", "g").unwrap();
        assert_eq!(request.non_empty_artifacts(), 1);
    }
}
