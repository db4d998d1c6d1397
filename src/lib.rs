pub mod config;
pub mod error;
pub mod execution;
pub mod few_shot;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod schema;
pub mod workflow;

// Relational store boundary and the SQLite implementation
pub mod db;

pub use config::AppConfig;
pub use error::{EngineError, FailureKind, WorkflowError, WorkflowFailure};
pub use workflow::{QueryResponse, QueryWorkflow, WorkflowPolicy, WorkflowRun, WorkflowState};
