//! SQLite Store
//!
//! `RelationalStore` over an sqlx `SqlitePool`. The pool is opened lazily by the
//! first caller; concurrent callers wait on the same initialization.

use crate::db::connection::{init_pool, DbPool, PoolSettings};
use crate::db::store::{QueryParam, QueryResult, RelationalStore, Row, SyntaxCheck};
use crate::error::{EngineError, Result};
use crate::schema::{ColumnSchema, TableSchema};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub struct SqliteStore {
    database_path: PathBuf,
    settings: PoolSettings,
    pool: OnceCell<DbPool>,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>, settings: PoolSettings) -> Self {
        Self {
            database_path: database_path.into(),
            settings,
            pool: OnceCell::new(),
        }
    }

    /// Wrap an already connected pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            database_path: PathBuf::new(),
            settings: PoolSettings::default(),
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    async fn pool(&self) -> Result<&DbPool> {
        self.pool
            .get_or_try_init(|| async {
                if !self.database_path.exists() {
                    return Err(EngineError::Store(format!(
                        "Database file not found at: {}",
                        self.database_path.display()
                    )));
                }
                let pool = init_pool(&self.database_path, &self.settings).await?;
                info!("Connected to SQLite database: {}", self.database_path.display());
                Ok(pool)
            })
            .await
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn introspect(&self) -> Result<Vec<TableSchema>> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;

        let table_names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            let columns: Vec<(String, String, i64)> = sqlx::query_as(
                "SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid",
            )
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await?;

            tables.push(TableSchema {
                name: table_name,
                columns: columns
                    .into_iter()
                    .map(|(name, data_type, pk)| ColumnSchema {
                        name,
                        data_type,
                        primary_key: pk > 0,
                    })
                    .collect(),
            });
        }

        debug!("Introspected {} tables", tables.len());
        Ok(tables)
    }

    async fn check_syntax(&self, sql: &str) -> Result<SyntaxCheck> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;

        // EXPLAIN compiles the statement into a program without running it.
        let explain = format!("EXPLAIN {}", sql);
        match sqlx::query(&explain).persistent(false).execute(&mut *conn).await {
            Ok(_) => Ok(SyntaxCheck::Valid),
            Err(sqlx::Error::Database(db_error)) => {
                let diagnostic = db_error.message().to_string();
                warn!("SQL syntax check failed for query '{}': {}", sql, diagnostic);
                Ok(SyntaxCheck::Invalid(diagnostic))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
        max_rows: Option<usize>,
    ) -> Result<QueryResult> {
        let pool = self.pool().await?;
        // Returned to the pool when dropped, on every exit path.
        let mut conn = pool.acquire().await?;

        info!("Executing SQL: {} with {} params", sql, params.len());
        let mut query = sqlx::query(sql).persistent(false);
        for param in params {
            query = bind_param(query, param);
        }

        let mut rows = Vec::new();
        let mut stream = query.fetch(&mut *conn);
        while let Some(row) = stream.try_next().await? {
            if let Some(limit) = max_rows {
                if rows.len() >= limit {
                    warn!("Result truncated at the {} row cap", limit);
                    break;
                }
            }
            rows.push(row_to_map(&row)?);
        }

        Ok(rows)
    }
}

fn bind_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &QueryParam,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_map(row: &SqliteRow) -> Result<Row> {
    let mut map = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            // Storage class of this value, not the declared column type.
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" | "NUMERIC" => {
                    let f = row.try_get_unchecked::<f64, _>(idx)?;
                    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
                }
                "BLOB" => Value::from(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
                _ => Value::from(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}
