//! Configuration management for helldiver.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (ANTHROPIC_API_KEY, NEO4J_*)
//! 2. Config file ($HELLDIVER_CONFIG or <data dir>/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use helldiver_core::graph::{DEFAULT_GROUP_ID, Neo4jConfig};
use helldiver_core::llm::AnthropicConfig;
use helldiver_core::research::ResearchConfig;
use helldiver_core::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Knowledge graph settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// Research workers and polling
    #[serde(default)]
    pub research: ResearchConfig,

    /// Backoff for rate-limited graph writes
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(flatten)]
    pub anthropic: AnthropicConfig,

    /// Model for intent classification and topic extraction
    #[serde(default = "default_fast_model")]
    pub intent_model: String,

    /// Model for conversation distillation
    #[serde(default = "default_fast_model")]
    pub distill_model: String,

    /// Model for tasking and refinement conversation
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(flatten)]
    pub neo4j: Neo4jConfig,

    /// Group identifier attached to every episode
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for helldiver data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Session directories live here
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

// Default value functions
fn default_fast_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_chat_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "helldiver", "helldiver") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".helldiver")
    }
}

fn default_sessions_dir() -> PathBuf {
    default_data_dir().join("sessions")
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic: AnthropicConfig::default(),
            intent_model: default_fast_model(),
            distill_model: default_fast_model(),
            chat_model: default_chat_model(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            neo4j: Neo4jConfig::default(),
            group_id: default_group_id(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sessions_dir: default_sessions_dir(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Override secrets and endpoints from the environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.llm.anthropic.api_key = key;
        }
        if let Some(uri) = var("NEO4J_URI") {
            self.graph.neo4j.uri = uri;
        }
        if let Some(user) = var("NEO4J_USER") {
            self.graph.neo4j.user = user;
        }
        if let Some(password) = var("NEO4J_PASSWORD") {
            self.graph.neo4j.password = password;
        }
        if let Some(database) = var("NEO4J_DATABASE") {
            self.graph.neo4j.database = database;
        }
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("HELLDIVER_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.llm.anthropic.api_key.is_empty()
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.data_dir)
            .context("Failed to create data directory")?;
        std::fs::create_dir_all(&self.paths.sessions_dir)
            .context("Failed to create sessions directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.research.roster.len(), 3);
        assert_eq!(config.research.poll_interval_secs, 10);
        assert_eq!(config.research.progress_interval_secs, 30);

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 60_000);
        assert_eq!(config.retry.max_delay_ms, 600_000);

        assert_eq!(config.graph.group_id, "helldiver_research");
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
[graph]
uri = "bolt://graph.internal:7687"
group_id = "team_research"

[retry]
max_retries = 5

[[research.roster]]
id = "security_analyst"
label = "Security Analysis"
instructions = "Find CVEs."
"#,
        )
        .expect("Failed to parse config");

        assert_eq!(config.graph.neo4j.uri, "bolt://graph.internal:7687");
        assert_eq!(config.graph.neo4j.user, "neo4j");
        assert_eq!(config.graph.group_id, "team_research");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 60_000);
        assert_eq!(config.research.roster.len(), 1);
        assert_eq!(config.research.roster[0].label, "Security Analysis");
        assert_eq!(config.research.worker_max_tokens, 4000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("NEO4J_URI", "neo4j://db:7687"),
            ("NEO4J_PASSWORD", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert!(config.has_api_key());
        assert_eq!(config.graph.neo4j.uri, "neo4j://db:7687");
        assert_eq!(config.graph.neo4j.password, "secret");
        assert_eq!(config.graph.neo4j.database, "neo4j");
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let temp = tempdir().expect("Failed to create temp dir");
        let config = Config {
            paths: PathsConfig {
                data_dir: temp.path().join("data"),
                sessions_dir: temp.path().join("data").join("sessions"),
            },
            ..Config::default()
        };

        assert!(!config.paths.sessions_dir.exists());
        config.ensure_dirs().expect("Failed to create directories");
        assert!(config.paths.data_dir.exists());
        assert!(config.paths.sessions_dir.exists());
    }
}
