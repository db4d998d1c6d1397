use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Infrastructure errors raised by the store, providers, corpus and config layers.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Example corpus error: {0}")]
    Corpus(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Runs `future` under `limit`, turning an elapsed deadline into [`EngineError::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            operation,
            elapsed: limit,
        }),
    }
}

/// Failure taxonomy of the question-to-rows workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Failed to retrieve database schema: {0}")]
    SchemaUnavailable(String),

    #[error("SQL generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Generated output is not a SELECT query: {0}")]
    InvalidGenerationOutput(String),

    #[error("SQL syntax check failed: {0}")]
    ValidationFailed(String),

    #[error("Generated SQL query has invalid syntax after fix attempts: {0}")]
    RepairExhausted(String),

    #[error("Error executing query: {0}")]
    ExecutionFailed(String),
}

impl WorkflowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::SchemaUnavailable(_) => FailureKind::SchemaUnavailable,
            WorkflowError::GenerationUnavailable(_) => FailureKind::GenerationUnavailable,
            WorkflowError::InvalidGenerationOutput(_) => FailureKind::InvalidGenerationOutput,
            WorkflowError::ValidationFailed(_) => FailureKind::ValidationFailed,
            WorkflowError::RepairExhausted(_) => FailureKind::RepairExhausted,
            WorkflowError::ExecutionFailed(_) => FailureKind::ExecutionFailed,
        }
    }

    /// The raw detail carried by the variant, without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            WorkflowError::SchemaUnavailable(m)
            | WorkflowError::GenerationUnavailable(m)
            | WorkflowError::InvalidGenerationOutput(m)
            | WorkflowError::ValidationFailed(m)
            | WorkflowError::RepairExhausted(m)
            | WorkflowError::ExecutionFailed(m) => m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    SchemaUnavailable,
    GenerationUnavailable,
    InvalidGenerationOutput,
    ValidationFailed,
    RepairExhausted,
    ExecutionFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::SchemaUnavailable => "SchemaUnavailable",
            FailureKind::GenerationUnavailable => "GenerationUnavailable",
            FailureKind::InvalidGenerationOutput => "InvalidGenerationOutput",
            FailureKind::ValidationFailed => "ValidationFailed",
            FailureKind::RepairExhausted => "RepairExhausted",
            FailureKind::ExecutionFailed => "ExecutionFailed",
        };
        write!(f, "{}", name)
    }
}

/// Structured failure handed to whatever serves the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&WorkflowError> for WorkflowFailure {
    fn from(error: &WorkflowError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
