//! Execution Gateway
//!
//! Runs already validated statements against the store. Read-only-ness is
//! checked upstream; the gateway only applies the row cap and the deadline.

use crate::db::{QueryParam, QueryResult, RelationalStore, SyntaxCheck};
use crate::error::{with_timeout, WorkflowError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_ROWS: usize = 1000;

pub struct ExecutionGateway {
    store: Arc<dyn RelationalStore>,
    max_rows: Option<usize>,
    timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(store: Arc<dyn RelationalStore>, max_rows: Option<usize>, timeout: Duration) -> Self {
        Self {
            store,
            max_rows,
            timeout,
        }
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.max_rows
    }

    /// Dry-run syntax check. Only a store that cannot run the check is an error.
    pub async fn validate(&self, sql: &str) -> Result<SyntaxCheck, WorkflowError> {
        with_timeout("syntax check", self.timeout, self.store.check_syntax(sql))
            .await
            .map_err(|e| {
                error!("Syntax check could not run: {}", e);
                WorkflowError::ExecutionFailed(e.to_string())
            })
    }

    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResult, WorkflowError> {
        let rows = with_timeout("query execution", self.timeout, self.store.execute(sql, params, self.max_rows))
            .await
            .map_err(|e| {
                error!("Error executing query: {}", e);
                WorkflowError::ExecutionFailed(e.to_string())
            })?;

        if let Some(cap) = self.max_rows {
            if rows.len() >= cap {
                warn!("Query returned the maximum of {} rows; further rows were not fetched", cap);
            }
        }
        info!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}
