//! Prompt Assembler
//!
//! Turns a question, the live schema and the retrieved examples into the chat
//! payload sent to the completion capability. Pure: no I/O.

use crate::few_shot::Example;
use crate::schema::SchemaDescription;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered chat messages making up one completion request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Prompt {
    pub messages: Vec<ChatMessage>,
}

impl Prompt {
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn system_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Everything needed to ask for a first candidate.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    pub schema: SchemaDescription,
    pub examples: Vec<Example>,
}

/// Everything needed to ask for a corrected candidate.
#[derive(Debug, Clone)]
pub struct RepairRequest<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaDescription,
    pub invalid_sql: &'a str,
    pub diagnostic: &'a str,
}

const GENERATION_RULES: &str = r#"You are an expert SQLite assistant with strong attention to detail. Given the question, database table schema, and example queries, output a valid SQLite query. When generating the query, follow these rules:

**Core Logic & Context:**
- When an entity is referenced by name, do not rely only on free-text name columns in the WHERE clause. Prefer joining through the foreign-key id columns to the table that owns the name, and keep the match tolerant of typos (e.g., LIKE), while prioritizing the id join.
- When dates are mentioned in the question, use the `strftime` function for comparisons. Assume dates are stored as text in 'YYYY-MM-DD HH:MM:SS' format unless the schema indicates otherwise.

**Query Structure & Best Practices:**
- Unless the user specifies a specific number of results, always limit the query to at most 5 results. Order the results by a relevant column to return the most interesting rows.
- Never query for all the columns of a table (e.g., `SELECT *`). Only select the columns relevant to the question.
- DO NOT write any DML or DDL statements (INSERT, UPDATE, DELETE, DROP etc.). Only SELECT statements are allowed.
- Double-check for common mistakes:
    - Using `NOT IN` with subqueries that might return NULL values.
    - Using `UNION` when `UNION ALL` is sufficient.
    - Using `BETWEEN` for ranges; make sure inclusivity matches the intent.
    - Data type mismatches in predicates (e.g., comparing text to numbers).
    - Quoting identifiers that contain spaces or reserved keywords.
    - Using the correct number of arguments for SQL functions.
    - Casting data types explicitly when needed.
    - Correct join conditions, especially when joining multiple tables.
    - Correct placement of parentheses in complex `WHERE` clauses.

**Output Format:**
- Only output the raw SQL query. Do not include explanations, markdown formatting (like ```sql ... ```), or any text other than the SQL query itself."#;

const REPAIR_RULES: &str = r#"Rules for Fixing:
- Analyze the error message and the invalid SQL to understand the cause of the syntax error.
- Refer to the database schema to ensure table and column names are correct and used appropriately.
- Consider the original natural language query to maintain the intended logic.
- Apply SQLite syntax rules correctly. Pay attention to function usage, join conditions, quoting, data types, and clause structure.
- The result must be a single read-only SELECT statement.
- Only output the corrected, raw SQL query. Do not include explanations or markdown formatting."#;

#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    domain_context: Option<String>,
}

impl PromptAssembler {
    pub fn new(domain_context: Option<String>) -> Self {
        Self {
            domain_context: domain_context.filter(|c| !c.trim().is_empty()),
        }
    }

    /// Rules, then examples as question/query turns, then schema and question.
    pub fn compose(&self, request: &GenerationRequest) -> Prompt {
        let mut prompt = Prompt::default();
        prompt.push(Role::System, self.system_rules());

        for example in &request.examples {
            prompt.push(Role::User, example.question.clone());
            prompt.push(Role::Assistant, example.query.clone());
        }

        prompt.push(
            Role::User,
            format!(
                "=== Schemas:\n{}\n=== Question:\n{}\n=== Resulting query:",
                request.schema.render(),
                request.question
            ),
        );
        prompt
    }

    pub fn compose_repair(&self, request: &RepairRequest<'_>) -> Prompt {
        let mut prompt = Prompt::default();
        prompt.push(
            Role::System,
            format!(
                "You are an expert SQLite assistant. You are given an invalid SQLite query, the error message it produced, the database schema, and the original natural language query.\n\
                 Your task is to fix the SQL query so it is syntactically correct and likely addresses the user's original intent based on the provided context.\n\n\
                 Database Schema:\n{}\n\
                 Original Natural Language Query:\n{}\n\n\
                 Invalid SQL Query:\n{}\n\n\
                 Syntax Error:\n{}\n\n\
                 {}",
                request.schema.render(),
                request.question,
                request.invalid_sql,
                request.diagnostic,
                REPAIR_RULES
            ),
        );
        prompt
    }

    fn system_rules(&self) -> String {
        match &self.domain_context {
            Some(context) => format!("{}\n\n**Domain Context:**\n{}", GENERATION_RULES, context.trim()),
            None => GENERATION_RULES.to_string(),
        }
    }
}
