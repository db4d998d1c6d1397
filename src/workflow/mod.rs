//! Generation/Repair workflow
//!
//! Question in, rows out: fetch the schema, generate a candidate, validate it
//! with the store's dry-run check, repair a bounded number of times, execute.

pub mod sql_text;
pub mod state;

pub use sql_text::{is_select_shaped, normalize_candidate, screen_generated, strip_code_fences};
pub use state::{WorkflowAttempt, WorkflowState};

use crate::config::AppConfig;
use crate::db::{PoolSettings, QueryParam, QueryResult, RelationalStore, SqliteStore, SyntaxCheck};
use crate::error::{with_timeout, Result as EngineResult, WorkflowError, WorkflowFailure};
use crate::execution::{ExecutionGateway, DEFAULT_MAX_ROWS};
use crate::few_shot::{ExampleCorpus, FewShotSelector, DEFAULT_K};
use crate::llm::{build_providers, CompletionProvider};
use crate::prompt::{GenerationRequest, PromptAssembler, RepairRequest};
use crate::schema::{SchemaDescription, SchemaService};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Bounds applied to every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPolicy {
    pub max_fix_attempts: u32,
    pub example_count: usize,
    pub max_result_rows: Option<usize>,
    pub completion_timeout: Duration,
    pub embedding_timeout: Duration,
    pub store_timeout: Duration,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            max_fix_attempts: 1,
            example_count: DEFAULT_K,
            max_result_rows: Some(DEFAULT_MAX_ROWS),
            completion_timeout: Duration::from_millis(30_000),
            embedding_timeout: Duration::from_millis(15_000),
            store_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Trace and result of one `run()`.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    /// Last candidate produced, if generation got that far.
    pub sql: Option<String>,
    /// Repairs consumed.
    pub attempts: u32,
    pub states: Vec<WorkflowState>,
    pub result: Result<QueryResult, WorkflowError>,
}

impl WorkflowRun {
    pub fn rows(&self) -> Option<&QueryResult> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.result.as_ref().err()
    }

    pub fn final_state(&self) -> Option<WorkflowState> {
        self.states.last().copied()
    }
}

/// Upward response: the generated SQL, the rows, or a structured failure.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub sql_query: Option<String>,
    pub query_result: Option<QueryResult>,
    pub error: Option<WorkflowFailure>,
}

impl From<WorkflowRun> for QueryResponse {
    fn from(run: WorkflowRun) -> Self {
        match run.result {
            Ok(rows) => QueryResponse {
                sql_query: run.sql,
                query_result: Some(rows),
                error: None,
            },
            Err(e) => QueryResponse {
                sql_query: run.sql,
                query_result: None,
                error: Some(WorkflowFailure::from(&e)),
            },
        }
    }
}

enum Step {
    FetchSchema,
    Generate(SchemaDescription),
    Validate(SchemaDescription, WorkflowAttempt),
    Repair(SchemaDescription, WorkflowAttempt),
    Execute(WorkflowAttempt),
    Fail(WorkflowError),
}

pub struct QueryWorkflow {
    schema: SchemaService,
    examples: Arc<FewShotSelector>,
    llm: Arc<dyn CompletionProvider>,
    assembler: PromptAssembler,
    gateway: ExecutionGateway,
    policy: WorkflowPolicy,
}

impl QueryWorkflow {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        llm: Arc<dyn CompletionProvider>,
        examples: Arc<FewShotSelector>,
        assembler: PromptAssembler,
        policy: WorkflowPolicy,
    ) -> Self {
        Self {
            schema: SchemaService::new(Arc::clone(&store), policy.store_timeout),
            gateway: ExecutionGateway::new(store, policy.max_result_rows, policy.store_timeout),
            examples,
            llm,
            assembler,
            policy,
        }
    }

    /// Wire the SQLite store, the configured providers and the example corpus.
    pub fn from_config(config: &AppConfig) -> EngineResult<Self> {
        let providers = build_providers(&config.llm)?;
        info!(
            "Using {} for completions; embeddings {}",
            providers.completion.name(),
            if providers.embedding.is_some() { "enabled" } else { "disabled" }
        );

        let settings = PoolSettings {
            acquire_timeout: config.policy.store_timeout,
            ..PoolSettings::default()
        };
        let store: Arc<dyn RelationalStore> = Arc::new(SqliteStore::new(&config.database_path, settings));
        let examples = Arc::new(FewShotSelector::new(
            ExampleCorpus::new(config.example_source.clone()),
            providers.embedding,
            config.policy.embedding_timeout,
        ));

        Ok(Self::new(
            store,
            providers.completion,
            examples,
            PromptAssembler::new(config.domain_context.clone()),
            config.policy.clone(),
        ))
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn examples(&self) -> &FewShotSelector {
        &self.examples
    }

    pub async fn schema_description(&self) -> Result<SchemaDescription, WorkflowError> {
        self.schema.retrieve().await
    }

    /// Schema fetch and first generation only. The candidate has not been
    /// syntax checked.
    pub async fn generate_sql(&self, question: &str) -> Result<String, WorkflowError> {
        let schema = self.schema.retrieve().await?;
        self.generate_candidate(question, &schema).await
    }

    /// Fence stripping, the SELECT check and the store's dry-run check.
    pub async fn check_query(&self, sql: &str) -> Result<SyntaxCheck, WorkflowError> {
        let sql = normalize_candidate(sql)?;
        self.gateway.validate(&sql).await
    }

    /// Execute caller-supplied SQL without generation.
    pub async fn validate_and_execute(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResult, WorkflowError> {
        let sql = normalize_candidate(sql)?;
        match self.gateway.validate(&sql).await? {
            SyntaxCheck::Valid => self.gateway.execute(&sql, params).await,
            SyntaxCheck::Invalid(diagnostic) => Err(WorkflowError::ValidationFailed(diagnostic)),
        }
    }

    /// Run the workflow and shape the outcome for callers. Never fails.
    pub async fn answer(&self, question: &str) -> QueryResponse {
        QueryResponse::from(self.run(question).await)
    }

    pub async fn run(&self, question: &str) -> WorkflowRun {
        let run_id = Uuid::new_v4();
        let span = info_span!("workflow", %run_id);
        self.drive(run_id, question).instrument(span).await
    }

    async fn drive(&self, run_id: Uuid, question: &str) -> WorkflowRun {
        info!("Processing question: {}", question);
        let mut run = WorkflowRun {
            run_id,
            sql: None,
            attempts: 0,
            states: vec![WorkflowState::Init],
            result: Ok(Vec::new()),
        };

        let mut step = Step::FetchSchema;
        loop {
            step = match step {
                Step::FetchSchema => {
                    info!("Workflow step: Fetching schema");
                    match self.schema.retrieve().await {
                        Ok(schema) => {
                            run.states.push(WorkflowState::SchemaFetched);
                            Step::Generate(schema)
                        }
                        Err(e) => Step::Fail(e),
                    }
                }
                Step::Generate(schema) => {
                    info!("Workflow step: Generating initial SQL");
                    match self.generate_candidate(question, &schema).await {
                        Ok(sql) => {
                            run.states.push(WorkflowState::Generated);
                            run.sql = Some(sql.clone());
                            Step::Validate(schema, WorkflowAttempt::new(sql))
                        }
                        Err(e) => Step::Fail(e),
                    }
                }
                Step::Validate(schema, mut attempt) => {
                    info!("Workflow step: Checking SQL syntax (attempt {})", attempt.attempts + 1);
                    run.states.push(WorkflowState::Validating);
                    match self.gateway.validate(&attempt.candidate).await {
                        Ok(SyntaxCheck::Valid) if !is_select_shaped(&attempt.candidate) => {
                            Step::Fail(WorkflowError::InvalidGenerationOutput(attempt.candidate))
                        }
                        Ok(SyntaxCheck::Valid) => {
                            run.states.push(WorkflowState::Valid);
                            Step::Execute(attempt)
                        }
                        Ok(SyntaxCheck::Invalid(diagnostic)) => {
                            run.states.push(WorkflowState::Invalid);
                            if attempt.can_repair(self.policy.max_fix_attempts) {
                                warn!("Attempting to fix invalid SQL. Error: {}", diagnostic);
                                attempt.diagnostic = Some(diagnostic);
                                Step::Repair(schema, attempt)
                            } else {
                                Step::Fail(WorkflowError::RepairExhausted(diagnostic))
                            }
                        }
                        Err(e) => Step::Fail(e),
                    }
                }
                Step::Repair(schema, mut attempt) => {
                    run.states.push(WorkflowState::Fixing);
                    match self.repair_candidate(question, &schema, &attempt).await {
                        Ok(sql) => {
                            info!("Retrying with fixed SQL: {}", sql);
                            attempt.replace(sql.clone());
                            run.attempts = attempt.attempts;
                            run.sql = Some(sql);
                            Step::Validate(schema, attempt)
                        }
                        Err(e) => Step::Fail(e),
                    }
                }
                Step::Execute(attempt) => {
                    info!("Workflow step: Executing SQL query");
                    match self.gateway.execute(&attempt.candidate, &[]).await {
                        Ok(rows) => {
                            run.states.push(WorkflowState::Executed);
                            run.result = Ok(rows);
                            return run;
                        }
                        Err(e) => Step::Fail(e),
                    }
                }
                Step::Fail(e) => {
                    error!("Workflow failed: {}", e);
                    run.states.push(WorkflowState::Failed(e.kind()));
                    run.result = Err(e);
                    return run;
                }
            };
        }
    }

    async fn generate_candidate(&self, question: &str, schema: &SchemaDescription) -> Result<String, WorkflowError> {
        let examples = self.examples.select(question, self.policy.example_count).await;
        debug!("Using {} few-shot examples", examples.len());

        let prompt = self.assembler.compose(&GenerationRequest {
            question: question.to_string(),
            schema: schema.clone(),
            examples,
        });
        let raw = self.complete(&prompt).await?;
        let sql = screen_generated(&raw)?;
        info!("Generated SQL: {}", sql);
        Ok(sql)
    }

    async fn repair_candidate(
        &self,
        question: &str,
        schema: &SchemaDescription,
        attempt: &WorkflowAttempt,
    ) -> Result<String, WorkflowError> {
        let prompt = self.assembler.compose_repair(&RepairRequest {
            question,
            schema,
            invalid_sql: &attempt.candidate,
            diagnostic: attempt.diagnostic.as_deref().unwrap_or_default(),
        });
        let raw = self.complete(&prompt).await?;
        normalize_candidate(&raw)
    }

    async fn complete(&self, prompt: &crate::prompt::Prompt) -> Result<String, WorkflowError> {
        debug!("Sending {} messages to {}", prompt.messages.len(), self.llm.name());
        with_timeout("completion", self.policy.completion_timeout, self.llm.generate(prompt))
            .await
            .map_err(|e| {
                error!("Completion request failed: {}", e);
                WorkflowError::GenerationUnavailable(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_default_policy() {
        let policy = WorkflowPolicy::default();
        assert_eq!(policy.max_fix_attempts, 1);
        assert_eq!(policy.example_count, 3);
        assert_eq!(policy.max_result_rows, Some(1000));
    }

    #[test]
    fn test_response_from_failed_run_keeps_sql_and_failure() {
        let run = WorkflowRun {
            run_id: Uuid::new_v4(),
            sql: Some("SELEKT 1".to_string()),
            attempts: 1,
            states: vec![WorkflowState::Init, WorkflowState::Failed(FailureKind::RepairExhausted)],
            result: Err(WorkflowError::RepairExhausted("near \"SELEKT\": syntax error".to_string())),
        };
        let response = QueryResponse::from(run);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["sql_query"], "SELEKT 1");
        assert!(json["query_result"].is_null());
        assert_eq!(json["error"]["kind"], "RepairExhausted");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .ends_with("near \"SELEKT\": syntax error"));
    }
}
