//! Neo4j backend over the HTTP transactional endpoint.
//!
//! Statements are sent to `POST {uri}/db/{database}/tx/commit`. Neo4j reports
//! statement failures inside a 200 response, so the `errors` array is checked
//! on every call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use super::{EpisodeRecord, GraphConnector, GraphStore};
use crate::error::GraphError;

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT episode_uuid IF NOT EXISTS FOR (n:Episodic) REQUIRE n.uuid IS UNIQUE",
    "CREATE INDEX episode_group_id IF NOT EXISTS FOR (n:Episodic) ON (n.group_id)",
    "CREATE INDEX episode_valid_at IF NOT EXISTS FOR (n:Episodic) ON (n.valid_at)",
    "CREATE INDEX episode_group_name IF NOT EXISTS FOR (n:Episodic) ON (n.group_id, n.name)",
    "CREATE FULLTEXT INDEX episode_content IF NOT EXISTS \
     FOR (n:Episodic) ON EACH [n.content, n.source_description, n.name]",
];

// Every write is a new episode node; an earlier episode with the same name is left untouched.
const ADD_EPISODE: &str = "\
CREATE (e:Episodic {uuid: $uuid})
SET e.name = $name,
    e.group_id = $group_id,
    e.content = $content,
    e.source = 'text',
    e.source_description = $source_description,
    e.valid_at = datetime($valid_at),
    e.created_at = datetime()
RETURN e.uuid AS uuid";

/// Connection settings for the Neo4j HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_uri() -> String {
    "http://localhost:7474".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Neo4jConfig {
    /// HTTP base URL. Bolt-style URIs are mapped to the default HTTP port.
    pub fn http_base(&self) -> String {
        let uri = self.uri.trim_end_matches('/');
        for scheme in ["bolt://", "neo4j://"] {
            if let Some(rest) = uri.strip_prefix(scheme) {
                return format!("http://{}", rest.replace(":7687", ":7474"));
            }
        }
        for scheme in ["bolt+s://", "neo4j+s://"] {
            if let Some(rest) = uri.strip_prefix(scheme) {
                return format!("https://{}", rest.replace(":7687", ":7473"));
            }
        }
        uri.to_string()
    }

    pub fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.http_base(), self.database)
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// One Neo4j handle. Cheap to create; liveness is checked per request.
pub struct Neo4jHttpStore {
    client: reqwest::Client,
    config: Neo4jConfig,
}

impl Neo4jHttpStore {
    pub fn new(config: Neo4jConfig) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn run(&self, statements: Vec<Value>) -> Result<Vec<Value>, GraphError> {
        let response = self
            .client
            .post(self.config.commit_url())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GraphError::RateLimited(format!("HTTP {}", status)));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GraphError::Connection(format!("authentication failed (HTTP {})", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GraphError::Rejected(format!("HTTP {}: {}", status, text)));
        }

        let body: TxResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Protocol(e.to_string()))?;

        if let Some(err) = body.errors.into_iter().next() {
            return Err(classify_tx_error(err));
        }
        Ok(body.results)
    }
}

fn episode_statement(episode: &EpisodeRecord, uuid: &str) -> Value {
    json!({
        "statement": ADD_EPISODE,
        "parameters": {
            "uuid": uuid,
            "name": episode.name,
            "content": episode.body,
            "source_description": episode.source_description,
            "valid_at": episode.reference_time.to_rfc3339(),
            "group_id": episode.group_id,
        }
    })
}

/// The uuid returned by the first row of the first statement.
fn created_uuid(results: &[Value]) -> Option<&str> {
    results.first()?["data"].get(0)?["row"].get(0)?.as_str()
}

fn classify_tx_error(err: TxError) -> GraphError {
    let message = format!("{}: {}", err.code, err.message);
    if err.code.contains("TransientError") {
        GraphError::RateLimited(message)
    } else if err.code.contains("Security") {
        GraphError::Connection(message)
    } else {
        GraphError::Rejected(message)
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn build_indexes(&self) -> Result<(), GraphError> {
        // One schema statement per transaction.
        for statement in INDEX_STATEMENTS {
            self.run(vec![json!({ "statement": statement })]).await?;
        }
        Ok(())
    }

    async fn add_episode(&self, episode: &EpisodeRecord) -> Result<(), GraphError> {
        let uuid = Uuid::new_v4().to_string();
        debug!(episode = %episode.name, uuid = %uuid, bytes = episode.body.len(), "Writing episode");

        let results = self.run(vec![episode_statement(episode, &uuid)]).await?;
        match created_uuid(&results) {
            Some(created) if created == uuid => Ok(()),
            _ => Err(GraphError::Protocol(format!(
                "episode '{}' was not created",
                episode.name
            ))),
        }
    }

    async fn verify_connectivity(&self) -> Result<(), GraphError> {
        self.run(vec![json!({ "statement": "RETURN 1" })])
            .await
            .map(|_| ())
            .map_err(|e| match e {
                GraphError::Rejected(msg) | GraphError::Protocol(msg) => GraphError::Connection(msg),
                other => other,
            })
    }
}

/// Hands out fresh [`Neo4jHttpStore`] handles.
pub struct Neo4jConnector {
    config: Neo4jConfig,
}

impl Neo4jConnector {
    pub fn new(config: Neo4jConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl GraphConnector for Neo4jConnector {
    async fn connect(&self) -> Result<Box<dyn GraphStore>, GraphError> {
        debug!(uri = %self.config.http_base(), "Opening Neo4j handle");
        Ok(Box::new(Neo4jHttpStore::new(self.config.clone())?))
    }
}
