//! Configuration
//!
//! Everything is read from the environment (after loading `.env`). Lookups go
//! through a closure so callers and tests can layer their own values on top.

use crate::error::{EngineError, Result};
use crate::few_shot::{CorpusSource, RemoteCollection};
use crate::llm::{LlmProviderKind, LlmSettings};
use crate::workflow::WorkflowPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub llm: LlmSettings,
    pub example_source: CorpusSource,
    pub policy: WorkflowPolicy,
    /// Extra paragraph appended to the generation rules.
    pub domain_context: Option<String>,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| EngineError::Config("DATABASE_PATH must be set".to_string()))?;

        let provider = match get("LLM_PROVIDER") {
            Some(value) => LlmProviderKind::from_str(&value)?,
            None => LlmProviderKind::OpenAi,
        };
        let llm = LlmSettings {
            provider,
            api_key: get("LLM_API_KEY"),
            model: get("LLM_MODEL"),
            base_url: get("LLM_BASE_URL"),
            embedding_model: get("EMBEDDING_MODEL"),
            embeddings_enabled: parse_bool(&get, "EMBEDDINGS_ENABLED", true)?,
            ..LlmSettings::default()
        };

        let defaults = WorkflowPolicy::default();
        let policy = WorkflowPolicy {
            max_fix_attempts: parse_number(&get, "MAX_FIX_ATTEMPTS", defaults.max_fix_attempts)?,
            example_count: parse_number(&get, "FEW_SHOT_K", defaults.example_count)?,
            max_result_rows: match parse_number(&get, "MAX_RESULT_ROWS", defaults.max_result_rows.unwrap_or(0))? {
                0 => None,
                cap => Some(cap),
            },
            completion_timeout: parse_millis(&get, "COMPLETION_TIMEOUT_MS", defaults.completion_timeout)?,
            embedding_timeout: parse_millis(&get, "EMBEDDING_TIMEOUT_MS", defaults.embedding_timeout)?,
            store_timeout: parse_millis(&get, "STORE_TIMEOUT_MS", defaults.store_timeout)?,
        };

        Ok(Self {
            database_path,
            llm,
            example_source: example_source(&get)?,
            policy,
            domain_context: get("PROMPT_DOMAIN_CONTEXT"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()).to_lowercase(),
        })
    }
}

fn example_source<G>(get: &G) -> Result<CorpusSource>
where
    G: Fn(&str) -> Option<String>,
{
    let source = get("EXAMPLE_SOURCE").unwrap_or_else(|| "local".to_string());
    match source.to_lowercase().as_str() {
        "local" => Ok(CorpusSource::Local),
        "mongodb" => {
            let (connection_string, database, collection) = match (
                get("EXAMPLE_DB_CONNECTION_STRING"),
                get("EXAMPLE_DB_NAME"),
                get("EXAMPLE_DB_COLLECTION"),
            ) {
                (Some(connection_string), Some(database), Some(collection)) => (connection_string, database, collection),
                _ => {
                    warn!("EXAMPLE_SOURCE=mongodb requires EXAMPLE_DB_CONNECTION_STRING, EXAMPLE_DB_NAME and EXAMPLE_DB_COLLECTION. Using local examples.");
                    return Ok(CorpusSource::Local);
                }
            };
            Ok(CorpusSource::Remote(RemoteCollection {
                connection_string,
                database,
                collection,
                timeout: parse_millis(get, "EXAMPLE_DB_TIMEOUT_MS", crate::few_shot::corpus::DEFAULT_REMOTE_TIMEOUT)?,
            }))
        }
        other => {
            warn!("Unknown EXAMPLE_SOURCE '{}'. Using local examples.", other);
            Ok(CorpusSource::Local)
        }
    }
}

fn parse_number<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value
            .parse()
            .map_err(|_| EngineError::Config(format!("{} must be a non-negative integer, got '{}'", key, value))),
        None => Ok(default),
    }
}

fn parse_millis<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_number(get, key, default_ms).map(Duration::from_millis)
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(EngineError::Config(format!("{} must be a boolean, got '{}'", key, v))),
    }
}
