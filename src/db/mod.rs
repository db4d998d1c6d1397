//! Database module for the SQLite store
//!
//! This module provides the relational store seam used by the workflow and its
//! sqlx-backed SQLite implementation.

pub mod connection;
pub mod sqlite;
pub mod store;

pub use connection::{init_pool, DbPool, PoolSettings};
pub use sqlite::SqliteStore;
pub use store::{QueryParam, QueryResult, RelationalStore, Row, SyntaxCheck};
