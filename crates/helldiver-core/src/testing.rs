//! In-memory collaborators shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{GraphError, LlmError};
use crate::graph::{EpisodeRecord, GraphConnector, GraphStore};
use crate::llm::{BatchOutcome, BatchRequest, BatchService, BatchStatus, GenerationRequest, TextGenerator};

// ─────────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    unreachable: bool,
    verify_fails: bool,
    live_generation: u32,
    connects: u32,
    index_builds: u32,
    writes: Vec<String>,
    attempts: HashMap<String, u32>,
    failures: HashMap<String, GraphError>,
}

/// In-memory graph backend shared by every handle it hands out.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().unwrap().unreachable = !reachable;
    }

    pub fn set_verify_fails(&self, fails: bool) {
        self.inner.lock().unwrap().verify_fails = fails;
    }

    /// Make the most recently issued handle fail its liveness check.
    pub fn kill_current_handle(&self) {
        self.inner.lock().unwrap().live_generation = 0;
    }

    pub fn fail_episode(&self, name: &str, error: GraphError) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(name.to_string(), error);
    }

    pub fn connects(&self) -> u32 {
        self.inner.lock().unwrap().connects
    }

    pub fn index_builds(&self) -> u32 {
        self.inner.lock().unwrap().index_builds
    }

    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn attempts(&self, name: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.inner.lock().unwrap().attempts.values().sum()
    }
}

struct FakeStore {
    backend: FakeBackend,
    generation: u32,
}

#[async_trait]
impl GraphStore for FakeStore {
    async fn build_indexes(&self) -> Result<(), GraphError> {
        self.backend.inner.lock().unwrap().index_builds += 1;
        Ok(())
    }

    async fn add_episode(&self, episode: &EpisodeRecord) -> Result<(), GraphError> {
        let mut inner = self.backend.inner.lock().unwrap();
        *inner.attempts.entry(episode.name.clone()).or_default() += 1;
        if let Some(err) = inner.failures.get(&episode.name) {
            return Err(err.clone());
        }
        inner.writes.push(episode.name.clone());
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<(), GraphError> {
        let inner = self.backend.inner.lock().unwrap();
        if inner.unreachable || inner.verify_fails || inner.live_generation != self.generation
        {
            return Err(GraphError::Connection("connection reset".into()));
        }
        Ok(())
    }
}

pub struct FakeConnector {
    backend: FakeBackend,
}

impl FakeConnector {
    pub fn new(backend: &FakeBackend) -> Self {
        Self {
            backend: backend.clone(),
        }
    }
}

#[async_trait]
impl GraphConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn GraphStore>, GraphError> {
        let mut inner = self.backend.inner.lock().unwrap();
        if inner.unreachable {
            return Err(GraphError::Connection("connection refused".into()));
        }
        inner.connects += 1;
        inner.live_generation = inner.connects;
        Ok(Box::new(FakeStore {
            backend: self.backend.clone(),
            generation: inner.connects,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM
// ─────────────────────────────────────────────────────────────────────────────

/// Answers by the first rule whose needle appears in the instructions or prompt.
#[derive(Clone, Default)]
pub struct FakeGenerator {
    rules: Arc<Mutex<Vec<(String, Result<String, LlmError>)>>>,
    calls: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, needle: &str, text: &str) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), Ok(text.to_string())));
        self
    }

    pub fn fail(self, needle: &str, error: LlmError) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), Err(error)));
        self
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(request.clone());
        let rules = self.rules.lock().unwrap();
        rules
            .iter()
            .find(|(needle, _)| {
                request.instructions.contains(needle.as_str())
                    || request.prompt.contains(needle.as_str())
            })
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| Ok("generated text".to_string()))
    }
}

#[derive(Default)]
struct BatchInner {
    submitted: Vec<Vec<BatchRequest>>,
    statuses: VecDeque<Result<BatchStatus, LlmError>>,
    results: Vec<BatchOutcome>,
    status_calls: u32,
    cancelled: Vec<String>,
}

/// Batch service whose status walks through a scripted sequence.
///
/// Once the script is exhausted, every status call reports the batch as
/// still processing.
#[derive(Clone, Default)]
pub struct FakeBatches {
    inner: Arc<Mutex<BatchInner>>,
}

impl FakeBatches {
    /// A batch that ends on the first status call with the given texts.
    pub fn ended_with(results: &[(&str, Option<&str>)]) -> Self {
        let fake = Self::default();
        fake.push_status(BatchStatus {
            ended: true,
            succeeded: results.iter().filter(|(_, t)| t.is_some()).count() as u32,
            errored: results.iter().filter(|(_, t)| t.is_none()).count() as u32,
            ..Default::default()
        });
        fake.inner.lock().unwrap().results = results
            .iter()
            .map(|(id, text)| BatchOutcome {
                custom_id: id.to_string(),
                text: text.map(str::to_string),
            })
            .collect();
        fake
    }

    /// A batch that never finishes.
    pub fn never_ends() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: BatchStatus) {
        self.inner.lock().unwrap().statuses.push_back(Ok(status));
    }

    /// The next status call fails with `error`.
    pub fn push_status_error(&self, error: LlmError) {
        self.inner.lock().unwrap().statuses.push_back(Err(error));
    }

    /// Queue another batch that ends on its first status call.
    pub fn push_ended(&self) {
        let succeeded = self.inner.lock().unwrap().results.len() as u32;
        self.push_status(BatchStatus {
            ended: true,
            succeeded,
            ..Default::default()
        });
    }

    pub fn submitted(&self) -> Vec<Vec<BatchRequest>> {
        self.inner.lock().unwrap().submitted.clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.inner.lock().unwrap().status_calls
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.inner.lock().unwrap().cancelled.clone()
    }
}

#[async_trait]
impl BatchService for FakeBatches {
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, LlmError> {
        let mut inner = self.inner.lock().unwrap();
        inner.submitted.push(requests);
        Ok(format!("msgbatch_{}", inner.submitted.len()))
    }

    async fn status(&self, _batch_id: &str) -> Result<BatchStatus, LlmError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_calls += 1;
        inner.statuses.pop_front().unwrap_or(Ok(BatchStatus {
            processing: 3,
            ..Default::default()
        }))
    }

    async fn results(&self, _batch_id: &str) -> Result<Vec<BatchOutcome>, LlmError> {
        Ok(self.inner.lock().unwrap().results.clone())
    }

    async fn cancel(&self, batch_id: &str) -> Result<(), LlmError> {
        self.inner
            .lock()
            .unwrap()
            .cancelled
            .push(batch_id.to_string());
        Ok(())
    }
}
