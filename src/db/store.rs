//! Relational Store Trait - Contract between the workflow and the backing database
//!
//! The workflow only ever talks to the store through this seam: introspection for
//! the schema service, a dry-run syntax check for validation, and execution.

use crate::error::Result;
use crate::schema::TableSchema;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row: column name to value, in the store's column order.
pub type Row = Map<String, Value>;

/// Rows in the order the store returned them.
pub type QueryResult = Vec<Row>;

/// Positional bind parameter.
pub type QueryParam = Value;

/// Outcome of a dry-run syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    Valid,
    /// Store diagnostic, verbatim.
    Invalid(String),
}

impl SyntaxCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SyntaxCheck::Valid)
    }
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Store name (e.g., "sqlite")
    fn name(&self) -> &'static str;

    /// Tables with their columns, declared types and primary-key flags.
    async fn introspect(&self) -> Result<Vec<TableSchema>>;

    /// Validate statement shape without materializing rows or side effects.
    ///
    /// `Ok(SyntaxCheck::Invalid)` carries the store diagnostic; `Err` means the
    /// check itself could not run.
    async fn check_syntax(&self, sql: &str) -> Result<SyntaxCheck>;

    /// Execute with bound parameters, fetching at most `max_rows` rows.
    async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
        max_rows: Option<usize>,
    ) -> Result<QueryResult>;
}
