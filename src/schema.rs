//! Schema Service
//!
//! Introspects the live store on every request and renders a description grouped
//! per table. Never cached: the description must reflect the current database.

use crate::db::RelationalStore;
use crate::error::{with_timeout, WorkflowError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type; empty when the column was declared without one.
    pub data_type: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Text form handed to the generation capability.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        for table in &self.tables {
            parts.push(format!("Table '{}':", table.name));
            for column in &table.columns {
                let pk = if column.primary_key { " (Primary Key)" } else { "" };
                if column.data_type.is_empty() {
                    parts.push(format!("  - {}{}", column.name, pk));
                } else {
                    parts.push(format!("  - {}: {}{}", column.name, column.data_type, pk));
                }
            }
            parts.push(String::new());
        }
        parts.join("\n")
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

pub struct SchemaService {
    store: Arc<dyn RelationalStore>,
    timeout: Duration,
}

impl SchemaService {
    pub fn new(store: Arc<dyn RelationalStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Fetch a fresh schema snapshot. All-or-nothing.
    pub async fn retrieve(&self) -> Result<SchemaDescription, WorkflowError> {
        match with_timeout("schema introspection", self.timeout, self.store.introspect()).await {
            Ok(tables) => {
                info!("Schema retrieved from {}: {} tables", self.store.name(), tables.len());
                Ok(SchemaDescription::new(tables))
            }
            Err(e) => {
                error!("Error retrieving schema: {}", e);
                Err(WorkflowError::SchemaUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clubs() -> TableSchema {
        TableSchema {
            name: "clubs".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "clubId".to_string(),
                    data_type: "INTEGER".to_string(),
                    primary_key: true,
                },
                ColumnSchema {
                    name: "clubName".to_string(),
                    data_type: "TEXT".to_string(),
                    primary_key: false,
                },
                ColumnSchema {
                    name: "notes".to_string(),
                    data_type: String::new(),
                    primary_key: false,
                },
            ],
        }
    }

    #[test]
    fn test_render_groups_columns_per_table() {
        let schema = SchemaDescription::new(vec![clubs()]);
        let text = schema.render();
        assert_eq!(
            text,
            "Table 'clubs':\n  - clubId: INTEGER (Primary Key)\n  - clubName: TEXT\n  - notes\n"
        );
    }

    #[test]
    fn test_table_lookup() {
        let schema = SchemaDescription::new(vec![clubs()]);
        assert!(schema.table("clubs").is_some());
        assert!(schema.table("matches").is_none());
        assert!(SchemaDescription::default().is_empty());
    }
}
