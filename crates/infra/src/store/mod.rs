//! Relational store boundary.
//!
//! Reconciliation only needs two operations: an equality lookup and an insert
//! that hands back the generated identifier. Anything richer stays out of the
//! trait so the in-memory and Postgres adapters stay interchangeable.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use clubseed_core::{EntityId, EntityKind, Predicate, Row, Values};
use thiserror::Error;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Store operation error.
///
/// These are **infrastructure errors**: the reconciler surfaces them as-is
/// and never retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("type mismatch on {table}.{column}: expected {expected}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
    },

    /// Unique or foreign-key constraint rejected a write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Pool, network or runtime failure.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Command/query interface over the relational store.
pub trait Store: Send + Sync {
    /// Rows of `table` matching every term of `predicate`, at most `limit`.
    fn select_where_equals(
        &self,
        table: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError>;

    /// Insert one row and return its store-generated identifier.
    fn insert(&self, table: &str, values: &Values) -> Result<EntityId, StoreError>;
}

impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    fn select_where_equals(
        &self,
        table: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        (**self).select_where_equals(table, predicate, limit)
    }

    fn insert(&self, table: &str, values: &Values) -> Result<EntityId, StoreError> {
        (**self).insert(table, values)
    }
}

impl<S> Store for &S
where
    S: Store + ?Sized,
{
    fn select_where_equals(
        &self,
        table: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        (**self).select_where_equals(table, predicate, limit)
    }

    fn insert(&self, table: &str, values: &Values) -> Result<EntityId, StoreError> {
        (**self).insert(table, values)
    }
}

/// Resolve a table name to its entity kind.
pub(crate) fn kind_for_table(table: &str) -> Result<EntityKind, StoreError> {
    EntityKind::from_table(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))
}

/// Check that every column exists on the table and every value fits the
/// column's type.
pub(crate) fn check_columns<'a>(
    kind: EntityKind,
    columns: impl IntoIterator<Item = (&'a str, &'a clubseed_core::Scalar)>,
) -> Result<(), StoreError> {
    for (column, value) in columns {
        let ty = kind
            .column_type(column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: kind.table().to_string(),
                column: column.to_string(),
            })?;
        if !ty.accepts(value) {
            return Err(StoreError::TypeMismatch {
                table: kind.table().to_string(),
                column: column.to_string(),
                expected: ty.to_string(),
            });
        }
    }
    Ok(())
}
