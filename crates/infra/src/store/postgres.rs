//! Postgres-backed store implementation.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Constraint` | Another process inserted the same natural key first |
//! | Database (foreign key violation) | `23503` | `Constraint` | Parent row vanished or was never committed |
//! | Database (not-null / check violation) | `23502` / `23514` | `Constraint` | Payload broke a column constraint |
//! | Database (other) | Any other | `Query` | Bad SQL, missing table, etc. |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Connection` | Store unreachable |
//! | Other | N/A | `Query` | Decode failures and the rest |
//!
//! ## Blocking
//!
//! The `Store` trait is synchronous. `PostgresStore` owns a current-thread
//! tokio runtime and blocks on it for every call, so it must not be used from
//! inside another tokio runtime.

use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _};
use tracing::instrument;
use uuid::Uuid;

use clubseed_core::{ColumnType, EntityId, EntityKind, Predicate, Row, Scalar, Values};

use super::{Store, StoreError, check_columns, kind_for_table};
use crate::config::SeedConfig;

/// Table definitions created by [`PostgresStore::ensure_schema`].
///
/// Unique constraints back the natural keys; foreign keys back the
/// dependency edges.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            uuid PRIMARY KEY DEFAULT gen_random_uuid(),
        telegram_id   bigint NOT NULL UNIQUE,
        username      text,
        first_name    text,
        last_name     text,
        language_code text,
        is_premium    boolean DEFAULT false,
        created_at    timestamptz NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id          uuid PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id     uuid NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name        text NOT NULL,
        description text,
        is_active   boolean DEFAULT true,
        created_at  timestamptz NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS competitors (
        id            uuid PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id    uuid NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        username      text NOT NULL,
        instagram_url text,
        is_active     boolean DEFAULT true,
        created_at    timestamptz NOT NULL DEFAULT NOW(),
        UNIQUE (project_id, username)
    )
    "#,
];

/// Postgres-backed relational store.
///
/// ## Thread Safety
///
/// The SQLx pool is thread-safe; the embedded runtime is only ever entered
/// through `block_on`, one call at a time per calling thread.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
    runtime: tokio::runtime::Runtime,
}

impl PostgresStore {
    /// Build the runtime and connect the pool described by `config`.
    pub fn connect(config: &SeedConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build runtime: {e}")))?;

        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect(&config.database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self { pool, runtime })
    }

    /// Create the seed tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.runtime.block_on(async {
            for statement in SCHEMA {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("ensure_schema", e))?;
            }
            Ok(())
        })
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub fn close(&self, grace: Duration) {
        let _ = self
            .runtime
            .block_on(async { tokio::time::timeout(grace, self.pool.close()).await });
    }

    async fn select_rows(
        &self,
        kind: EntityKind,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let mut query = build_select(kind, predicate, limit)?;
        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_where_equals", e))?;

        rows.iter().map(|row| decode_row(kind, row)).collect()
    }

    async fn insert_row(&self, kind: EntityKind, values: &Values) -> Result<EntityId, StoreError> {
        let mut query = build_insert(kind, values)?;
        let row = query
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;

        let id: Uuid = row
            .try_get("id")
            .map_err(|e| StoreError::Query(format!("failed to read generated id: {e}")))?;
        Ok(EntityId::from_uuid(id))
    }
}

impl Store for PostgresStore {
    #[instrument(skip(self, predicate), fields(terms = predicate.terms().len()), err)]
    fn select_where_equals(
        &self,
        table: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let kind = kind_for_table(table)?;
        self.runtime.block_on(self.select_rows(kind, predicate, limit))
    }

    #[instrument(skip(self, values), fields(columns = values.len()), err)]
    fn insert(&self, table: &str, values: &Values) -> Result<EntityId, StoreError> {
        let kind = kind_for_table(table)?;
        self.runtime.block_on(self.insert_row(kind, values))
    }
}

/// `SELECT id, <columns> FROM <table> WHERE ... LIMIT $n`.
///
/// Identifiers come from `EntityKind` only; every value is a bind parameter.
fn build_select<'a>(
    kind: EntityKind,
    predicate: &'a Predicate,
    limit: usize,
) -> Result<QueryBuilder<'a, Postgres>, StoreError> {
    check_columns(kind, predicate.terms().iter().map(|(c, v)| (c.as_str(), v)))?;

    let mut query = QueryBuilder::new("SELECT id");
    for column in kind.columns() {
        query.push(", ").push(column);
    }
    query.push(" FROM ").push(kind.table());

    for (i, (column, value)) in predicate.terms().iter().enumerate() {
        query.push(if i == 0 { " WHERE " } else { " AND " });
        query.push(column.as_str());
        if matches!(value, Scalar::Null) {
            query.push(" IS NULL");
        } else {
            query.push(" = ");
            push_scalar(&mut query, value);
        }
    }

    query.push(" LIMIT ");
    query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    Ok(query)
}

/// `INSERT INTO <table> (...) VALUES (...) RETURNING id`.
fn build_insert<'a>(
    kind: EntityKind,
    values: &'a Values,
) -> Result<QueryBuilder<'a, Postgres>, StoreError> {
    if values.contains("id") {
        return Err(StoreError::Query(format!("{}.id is store-generated", kind.table())));
    }
    check_columns(kind, values.iter())?;

    let mut query = QueryBuilder::new("INSERT INTO ");
    query.push(kind.table());

    if values.is_empty() {
        query.push(" DEFAULT VALUES RETURNING id");
        return Ok(query);
    }

    query.push(" (");
    for (i, column) in values.columns().enumerate() {
        if i > 0 {
            query.push(", ");
        }
        query.push(column);
    }
    query.push(") VALUES (");
    for (i, (column, value)) in values.iter().enumerate() {
        if i > 0 {
            query.push(", ");
        }
        match (value, kind.column_type(column)) {
            // Untyped NULL would be sent as text; bind it with the column's type.
            (Scalar::Null, Some(ty)) => push_null(&mut query, ty),
            _ => push_scalar(&mut query, value),
        }
    }
    query.push(") RETURNING id");
    Ok(query)
}

fn push_scalar(query: &mut QueryBuilder<'_, Postgres>, value: &Scalar) {
    match value {
        Scalar::Null => {
            query.push("NULL");
        }
        Scalar::Bool(v) => {
            query.push_bind(*v);
        }
        Scalar::Int(v) => {
            query.push_bind(*v);
        }
        Scalar::Text(v) => {
            query.push_bind(v.clone());
        }
        Scalar::Id(v) => {
            query.push_bind(*v.as_uuid());
        }
    }
}

fn push_null(query: &mut QueryBuilder<'_, Postgres>, ty: ColumnType) {
    match ty {
        ColumnType::Int => query.push_bind(None::<i64>),
        ColumnType::Text => query.push_bind(None::<String>),
        ColumnType::Bool => query.push_bind(None::<bool>),
        ColumnType::Uuid => query.push_bind(None::<Uuid>),
    };
}

fn decode_row(kind: EntityKind, row: &PgRow) -> Result<Row, StoreError> {
    let decode_err =
        |column: &str, e: sqlx::Error| StoreError::Query(format!("failed to decode {column}: {e}"));

    let id: Uuid = row.try_get("id").map_err(|e| decode_err("id", e))?;

    let mut values = Values::new();
    for column in kind.columns() {
        let Some(ty) = kind.column_type(column) else {
            continue;
        };
        let value = match ty {
            ColumnType::Int => row
                .try_get::<Option<i64>, _>(*column)
                .map(Scalar::from),
            ColumnType::Text => row
                .try_get::<Option<String>, _>(*column)
                .map(Scalar::from),
            ColumnType::Bool => row
                .try_get::<Option<bool>, _>(*column)
                .map(Scalar::from),
            ColumnType::Uuid => row
                .try_get::<Option<Uuid>, _>(*column)
                .map(|v| Scalar::from(v.map(EntityId::from_uuid))),
        }
        .map_err(|e| decode_err(*column, e))?;

        if value != Scalar::Null {
            values.set(*column, value);
        }
    }

    Ok(Row {
        id: EntityId::from_uuid(id),
        values,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique, foreign key, not-null and check violations
                Some("23505" | "23503" | "23502" | "23514") => StoreError::Constraint(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("timed out acquiring connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {operation}: {e}")),
        sqlx::Error::Configuration(e) => {
            StoreError::Connection(format!("invalid connection settings in {operation}: {e}"))
        }
        _ => StoreError::Query(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_sql_binds_every_value() {
        let predicate = Predicate::new()
            .where_eq("project_id", EntityId::new())
            .where_eq("username", "ace.padel");
        let query = build_select(EntityKind::Competitor, &predicate, 1).unwrap();

        assert_eq!(
            query.sql(),
            "SELECT id, project_id, username, instagram_url, is_active FROM competitors \
             WHERE project_id = $1 AND username = $2 LIMIT $3"
        );
    }

    #[test]
    fn select_sql_uses_is_null_for_null_terms() {
        let predicate = Predicate::new().where_eq("username", Scalar::Null);
        let query = build_select(EntityKind::User, &predicate, 5).unwrap();
        assert!(query.sql().ends_with("WHERE username IS NULL LIMIT $1"));
    }

    #[test]
    fn insert_sql_lists_columns_in_order() {
        let values = Values::new()
            .with("telegram_id", 3003_i64)
            .with("username", "ace")
            .with("language_code", Scalar::Null);
        let query = build_insert(EntityKind::User, &values).unwrap();

        assert_eq!(
            query.sql(),
            "INSERT INTO users (language_code, telegram_id, username) VALUES ($1, $2, $3) RETURNING id"
        );
    }

    #[test]
    fn builders_reject_foreign_columns_before_touching_sql() {
        let predicate = Predicate::new().where_eq("name; DROP TABLE users", "x");
        assert!(matches!(
            build_select(EntityKind::Project, &predicate, 1),
            Err(StoreError::UnknownColumn { .. })
        ));

        let values = Values::new().with("id", EntityId::new());
        assert!(matches!(
            build_insert(EntityKind::Project, &values),
            Err(StoreError::Query(_))
        ));

        let values = Values::new().with("is_active", "yes");
        assert!(matches!(
            build_insert(EntityKind::Project, &values),
            Err(StoreError::TypeMismatch { .. })
        ));
    }
}
