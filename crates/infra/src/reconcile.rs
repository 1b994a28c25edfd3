//! Find-or-create reconciliation of a single entity.
//!
//! ## Flow
//!
//! 1. Validate the natural key (arity, no blank fields, column types) and the
//!    parent argument. Nothing touches the store before this passes.
//! 2. `select_where_equals(table, parent + key, limit 1)`.
//! 3. Found: return the existing id, row untouched.
//! 4. Not found: insert payload merged with key and parent columns, return
//!    the generated id.
//!
//! At most one insert per call; never an update or delete. Read-then-insert
//! is not atomic across processes: a concurrent seeder can win the race, in
//! which case the store's unique constraint surfaces as `StoreError`.

use thiserror::Error;
use tracing::{debug, info, instrument};

use clubseed_core::{DomainError, EntityId, EntityKind, NaturalKey, Predicate, Values};

use crate::store::{Store, StoreError};

/// Reconciliation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Malformed or missing natural key, or a payload the kind cannot hold.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A parent-scoped kind was reconciled before its parent.
    #[error("{kind} requires a reconciled {parent} identifier")]
    Dependency {
        kind: EntityKind,
        parent: EntityKind,
    },

    /// The store rejected or failed a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub id: EntityId,
    /// `true` when this call inserted the row.
    pub created: bool,
}

/// Find-or-create over a [`Store`].
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    store: S,
}

impl<S> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: Store> Reconciler<S> {
    /// Reconcile and return only the identifier.
    pub fn reconcile(
        &self,
        kind: EntityKind,
        key: &NaturalKey,
        payload: &Values,
        parent: Option<EntityId>,
    ) -> Result<EntityId, ReconcileError> {
        self.resolve(kind, key, payload, parent).map(|r| r.id)
    }

    /// Reconcile and report whether a row was created.
    #[instrument(skip_all, fields(kind = %kind, key = %key, parent = ?parent))]
    pub fn resolve(
        &self,
        kind: EntityKind,
        key: &NaturalKey,
        payload: &Values,
        parent: Option<EntityId>,
    ) -> Result<Reconciled, ReconcileError> {
        validate_key(kind, key)?;
        validate_payload(kind, payload)?;
        let parent = check_parent(kind, parent)?;

        let mut predicate = Predicate::new();
        if let Some((column, id)) = parent {
            predicate = predicate.where_eq(column, id);
        }
        for (column, value) in kind.key_columns().iter().zip(key.fields()) {
            predicate = predicate.where_eq(*column, value.clone());
        }

        if let Some(existing) = self
            .store
            .select_where_equals(kind.table(), &predicate, 1)?
            .into_iter()
            .next()
        {
            debug!(id = %existing.id, "already present");
            return Ok(Reconciled {
                id: existing.id,
                created: false,
            });
        }

        // Key and parent columns win over same-named payload entries.
        let mut values = payload.clone();
        for (column, value) in predicate.terms() {
            values.set(column.as_str(), value.clone());
        }

        let id = self.store.insert(kind.table(), &values)?;
        info!(id = %id, "created");
        Ok(Reconciled { id, created: true })
    }
}

fn validate_key(kind: EntityKind, key: &NaturalKey) -> Result<(), ReconcileError> {
    let columns = kind.key_columns();
    if key.len() != columns.len() {
        return Err(ReconcileError::validation(format!(
            "{kind} natural key needs {} field(s) ({}), got {}",
            columns.len(),
            columns.join(", "),
            key.len()
        )));
    }

    for (column, value) in columns.iter().zip(key.fields()) {
        if value.is_blank() {
            return Err(ReconcileError::validation(format!(
                "{kind} natural key field '{column}' is empty"
            )));
        }
        let fits = kind.column_type(column).is_some_and(|ty| ty.accepts(value));
        if !fits {
            return Err(ReconcileError::validation(format!(
                "{kind} natural key field '{column}' has the wrong type: {value}"
            )));
        }
    }
    Ok(())
}

fn validate_payload(kind: EntityKind, payload: &Values) -> Result<(), ReconcileError> {
    for (column, value) in payload.iter() {
        if column == "id" {
            return Err(ReconcileError::validation(format!(
                "{kind} payload may not set the generated id"
            )));
        }
        match kind.column_type(column) {
            Some(ty) if ty.accepts(value) => {}
            Some(ty) => {
                return Err(ReconcileError::validation(format!(
                    "{kind} payload column '{column}' expects {ty}, got {value}"
                )));
            }
            None => {
                return Err(ReconcileError::validation(format!(
                    "{kind} has no column '{column}'"
                )));
            }
        }
    }
    Ok(())
}

fn check_parent(
    kind: EntityKind,
    parent: Option<EntityId>,
) -> Result<Option<(&'static str, EntityId)>, ReconcileError> {
    match (kind.parent(), kind.parent_column(), parent) {
        (Some(_), Some(column), Some(id)) => Ok(Some((column, id))),
        (Some(parent_kind), _, None) => Err(ReconcileError::Dependency {
            kind,
            parent: parent_kind,
        }),
        (None, _, Some(_)) => Err(ReconcileError::validation(format!(
            "{kind} is keyed globally and takes no parent"
        ))),
        _ => Ok(None),
    }
}
