#![allow(dead_code)]

use async_trait::async_trait;
use nl2sql_engine::db::{QueryParam, QueryResult, RelationalStore, Row, SyntaxCheck};
use nl2sql_engine::error::{EngineError, Result};
use nl2sql_engine::few_shot::{Example, ExampleCorpus, FewShotSelector};
use nl2sql_engine::llm::{CompletionProvider, Embedding, EmbeddingProvider};
use nl2sql_engine::prompt::{Prompt, PromptAssembler};
use nl2sql_engine::schema::{ColumnSchema, TableSchema};
use nl2sql_engine::{QueryWorkflow, WorkflowPolicy};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FEYENOORD_AJAX_QUESTION: &str = "Hoe vaak heeft Feyenoord gewonnen van Ajax?";

const FIXTURE: &[&str] = &[
    "CREATE TABLE clubs (clubId INTEGER PRIMARY KEY, clubName TEXT NOT NULL)",
    "CREATE TABLE matches (
        matchId INTEGER PRIMARY KEY,
        dateAndTime TEXT,
        homeClubId INTEGER,
        awayClubId INTEGER,
        homeClubName TEXT,
        awayClubName TEXT,
        homeClubFinalScore INTEGER,
        awayClubFinalScore INTEGER
    )",
    "INSERT INTO clubs (clubId, clubName) VALUES (1, 'Feyenoord'), (2, 'Ajax'), (3, 'PSV')",
    "INSERT INTO matches VALUES
        (1, '2021-01-17 14:30:00', 1, 2, 'Feyenoord', 'Ajax', 2, 1),
        (2, '2021-04-18 14:30:00', 2, 1, 'Ajax', 'Feyenoord', 0, 3),
        (3, '2022-01-23 14:30:00', 1, 2, 'Feyenoord', 'Ajax', 1, 1),
        (4, '2022-04-10 14:30:00', 2, 1, 'Ajax', 'Feyenoord', 2, 0),
        (5, '2022-05-01 14:30:00', 1, 3, 'Feyenoord', 'PSV', 4, 0)",
];

/// SQLite file in the temp dir, removed on drop.
pub struct FixtureDb {
    path: PathBuf,
}

impl FixtureDb {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FixtureDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Fresh SQLite database with clubs and matches.
pub async fn fixture_db() -> FixtureDb {
    let db = FixtureDb {
        path: std::env::temp_dir().join(format!("nl2sql-test-{}.db", uuid::Uuid::new_v4())),
    };
    let options = SqliteConnectOptions::new().filename(db.path()).create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in FIXTURE {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
    db
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn matches_table() -> TableSchema {
    let column = |name: &str, data_type: &str, primary_key: bool| ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        primary_key,
    };
    TableSchema {
        name: "matches".to_string(),
        columns: vec![
            column("matchId", "INTEGER", true),
            column("homeClubName", "TEXT", false),
            column("awayClubName", "TEXT", false),
        ],
    }
}

/// Completion stub answering from a script, recording every prompt.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedCompletion {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn repeating(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            repeat: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(vec![Err(message.to_string())])),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(Ok(reply)), _) => Ok(reply),
            (Some(Err(message)), _) => Err(EngineError::Llm(message)),
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(EngineError::Llm("no scripted reply left".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Store stub with scripted syntax checks and a fixed result.
pub struct StubStore {
    tables: Option<Vec<TableSchema>>,
    checks: Mutex<VecDeque<SyntaxCheck>>,
    rows: std::result::Result<QueryResult, String>,
    checked: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
}

impl StubStore {
    pub fn new(rows: QueryResult) -> Self {
        Self {
            tables: Some(vec![matches_table()]),
            checks: Mutex::new(VecDeque::new()),
            rows: Ok(rows),
            checked: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            tables: None,
            ..Self::new(Vec::new())
        }
    }

    /// Syntax check outcomes in order; once exhausted every check passes.
    pub fn with_checks(self, checks: Vec<SyntaxCheck>) -> Self {
        *self.checks.lock().unwrap() = checks.into();
        self
    }

    pub fn failing_execution(mut self, message: &str) -> Self {
        self.rows = Err(message.to_string());
        self
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelationalStore for StubStore {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn introspect(&self) -> Result<Vec<TableSchema>> {
        self.tables
            .clone()
            .ok_or_else(|| EngineError::Store("Database file not found at: missing.db".to_string()))
    }

    async fn check_syntax(&self, sql: &str) -> Result<SyntaxCheck> {
        self.checked.lock().unwrap().push(sql.to_string());
        Ok(self.checks.lock().unwrap().pop_front().unwrap_or(SyntaxCheck::Valid))
    }

    async fn execute(&self, sql: &str, _params: &[QueryParam], _max_rows: Option<usize>) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.rows.clone().map_err(EngineError::Store)
    }
}

/// Embeds text as keyword hits over a small vocabulary. Counts calls.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

const VOCABULARY: [&str; 4] = ["ajax", "psv", "scoor", "gewonnen"];

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.len() > 1 {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
        }
        // Give concurrent callers a chance to race the index build.
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector: Embedding = VOCABULARY
                    .iter()
                    .map(|word| if lower.contains(word) { 1.0 } else { 0.0 })
                    .collect();
                // Keeps every vector non-zero.
                vector.push(0.1);
                vector
            })
            .collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

pub fn test_policy() -> WorkflowPolicy {
    WorkflowPolicy {
        completion_timeout: Duration::from_secs(2),
        embedding_timeout: Duration::from_secs(2),
        store_timeout: Duration::from_secs(5),
        ..WorkflowPolicy::default()
    }
}

pub fn workflow(store: Arc<dyn RelationalStore>, llm: Arc<dyn CompletionProvider>) -> QueryWorkflow {
    QueryWorkflow::new(
        store,
        llm,
        Arc::new(FewShotSelector::disabled()),
        PromptAssembler::default(),
        test_policy(),
    )
}

pub fn workflow_with_examples(
    store: Arc<dyn RelationalStore>,
    llm: Arc<dyn CompletionProvider>,
    examples: Vec<Example>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> QueryWorkflow {
    let selector = FewShotSelector::new(ExampleCorpus::fixed(examples), Some(embedder), Duration::from_secs(2));
    QueryWorkflow::new(store, llm, Arc::new(selector), PromptAssembler::default(), test_policy())
}
