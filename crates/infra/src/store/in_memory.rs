//! In-memory store for tests/dev.
//!
//! Mirrors the Postgres schema closely enough for reconciliation tests:
//! columns and types are checked, and natural keys are unique per table
//! (the same constraints `PostgresStore::ensure_schema` creates).

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use clubseed_core::{EntityId, EntityKind, Predicate, Row, Scalar, Values};

use super::{Store, StoreError, check_columns, kind_for_table};

/// In-memory relational store with call counters.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<EntityKind, Vec<Row>>>,
    inserts: AtomicUsize,
    selects: AtomicUsize,
    /// Remaining successful inserts before every insert fails.
    insert_budget: RwLock<Option<usize>>,
    fail_selects: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `insert` calls (successful or not) since creation or the last reset.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of `select_where_equals` calls since creation or the last reset.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.inserts.store(0, Ordering::SeqCst);
        self.selects.store(0, Ordering::SeqCst);
    }

    /// Let the next `n` inserts succeed, then fail every insert with a
    /// connection error.
    pub fn fail_inserts_after(&self, n: usize) {
        if let Ok(mut budget) = self.insert_budget.write() {
            *budget = Some(n);
        }
    }

    /// Make every `select_where_equals` fail with a connection error
    /// (`false` restores normal reads).
    pub fn fail_selects(&self, fail: bool) {
        self.fail_selects.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let Some(kind) = EntityKind::from_table(table) else {
            return vec![];
        };
        match self.tables.read() {
            Ok(tables) => tables
                .get(&kind)
                .cloned()
                .unwrap_or_default(),
            Err(_) => vec![],
        }
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    fn take_insert_budget(&self) -> Result<(), StoreError> {
        let mut budget = self
            .insert_budget
            .write()
            .map_err(|_| StoreError::Connection("insert budget lock poisoned".to_string()))?;
        match budget.as_mut() {
            Some(0) => Err(StoreError::Connection(
                "simulated connection loss".to_string(),
            )),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Natural key predicate (parent column included) for a row being inserted.
fn unique_key(kind: EntityKind, values: &Values) -> Predicate {
    let columns = kind.parent_column().into_iter().chain(kind.key_columns().iter().copied());
    columns.fold(Predicate::new(), |predicate, column| {
        let value = values.get(column).cloned().unwrap_or(Scalar::Null);
        predicate.where_eq(column, value)
    })
}

impl Store for InMemoryStore {
    fn select_where_equals(
        &self,
        table: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        self.selects.fetch_add(1, Ordering::SeqCst);

        let kind = kind_for_table(table)?;
        check_columns(kind, predicate.terms().iter().map(|(c, v)| (c.as_str(), v)))?;
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(
                "simulated connection loss".to_string(),
            ));
        }

        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Connection("table lock poisoned".to_string()))?;

        let Some(rows) = tables.get(&kind) else {
            return Ok(vec![]);
        };

        Ok(rows
            .iter()
            .filter(|row| {
                predicate.terms().iter().all(|(column, expected)| {
                    if column == "id" {
                        expected.as_id() == Some(row.id)
                    } else {
                        row.values.get(column).unwrap_or(&Scalar::Null) == expected
                    }
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn insert(&self, table: &str, values: &Values) -> Result<EntityId, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);

        let kind = kind_for_table(table)?;
        if values.contains("id") {
            return Err(StoreError::Query(format!("{table}.id is store-generated")));
        }
        check_columns(kind, values.iter())?;

        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Connection("table lock poisoned".to_string()))?;

        let rows = tables.entry(kind).or_default();

        let key = unique_key(kind, values);
        if rows.iter().any(|row| key.matches(&row.values)) {
            return Err(StoreError::Constraint(format!(
                "duplicate natural key on {table}"
            )));
        }
        self.take_insert_budget()?;

        let id = EntityId::new();
        rows.push(Row {
            id,
            values: values.clone(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(telegram_id: i64) -> Values {
        Values::new()
            .with("telegram_id", telegram_id)
            .with("username", "ace")
    }

    #[test]
    fn insert_then_select_by_key() {
        let store = InMemoryStore::new();
        let id = store.insert("users", &user(3003)).unwrap();

        let rows = store
            .select_where_equals("users", &Predicate::new().where_eq("telegram_id", 3003_i64), 1)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(store.insert_count(), 1);
        assert_eq!(store.select_count(), 1);
    }

    #[test]
    fn select_by_id_and_limit() {
        let store = InMemoryStore::new();
        let a = store.insert("users", &user(1)).unwrap();
        store.insert("users", &user(2)).unwrap();

        let by_id = store
            .select_where_equals("users", &Predicate::new().where_eq("id", a), 10)
            .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].id, a);

        let limited = store
            .select_where_equals("users", &Predicate::new().where_eq("username", "ace"), 1)
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn duplicate_natural_key_is_a_constraint_violation() {
        let store = InMemoryStore::new();
        store.insert("users", &user(3003)).unwrap();
        let err = store.insert("users", &user(3003)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.row_count("users"), 1);
    }

    #[test]
    fn same_child_key_under_different_parents_is_allowed() {
        let store = InMemoryStore::new();
        let u1 = store.insert("users", &user(1)).unwrap();
        let u2 = store.insert("users", &user(2)).unwrap();

        for owner in [u1, u2] {
            let project = Values::new().with("user_id", owner).with("name", "X");
            store.insert("projects", &project).unwrap();
        }
        assert_eq!(store.row_count("projects"), 2);
    }

    #[test]
    fn rejects_unknown_tables_columns_and_types() {
        let store = InMemoryStore::new();

        assert!(matches!(
            store.insert("bookings", &Values::new()),
            Err(StoreError::UnknownTable(_))
        ));
        assert!(matches!(
            store.insert("users", &user(1).with("court", "A")),
            Err(StoreError::UnknownColumn { .. })
        ));
        assert!(matches!(
            store.insert("users", &Values::new().with("telegram_id", "3003")),
            Err(StoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.insert("users", &user(1).with("id", EntityId::new())),
            Err(StoreError::Query(_))
        ));
        assert_eq!(store.row_count("users"), 0);
    }

    #[test]
    fn insert_budget_simulates_connection_loss() {
        let store = InMemoryStore::new();
        store.fail_inserts_after(1);

        store.insert("users", &user(1)).unwrap();
        let err = store.insert("users", &user(2)).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(store.row_count("users"), 1);
        assert_eq!(store.insert_count(), 2);
    }

    #[test]
    fn rejected_duplicates_do_not_spend_the_insert_budget() {
        let store = InMemoryStore::new();
        store.insert("users", &user(1)).unwrap();
        store.fail_inserts_after(1);

        let err = store.insert("users", &user(1)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        store.insert("users", &user(2)).unwrap();
        let err = store.insert("users", &user(3)).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(store.row_count("users"), 2);
    }

    #[test]
    fn failing_selects_can_be_switched_on_and_off() {
        let store = InMemoryStore::new();
        store.insert("users", &user(1)).unwrap();
        let by_key = Predicate::new().where_eq("telegram_id", 1_i64);

        store.fail_selects(true);
        let err = store.select_where_equals("users", &by_key, 1).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(store.select_count(), 1);

        store.fail_selects(false);
        assert_eq!(store.select_where_equals("users", &by_key, 1).unwrap().len(), 1);
    }

    #[test]
    fn reset_counts_keeps_rows() {
        let store = InMemoryStore::new();
        store.insert("users", &user(1)).unwrap();
        store.reset_counts();
        assert_eq!(store.insert_count(), 0);
        assert_eq!(store.row_count("users"), 1);
    }
}
