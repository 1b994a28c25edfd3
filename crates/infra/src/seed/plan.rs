//! Explicit dependency graph for a seed run.
//!
//! Each step occupies a [`Slot`]; a child step names its parent's slot. A
//! parent must already be in the plan when the child is pushed, so step order
//! is always a valid dependency order.

use clubseed_core::{EntityKind, NaturalKey, Values};

use crate::reconcile::ReconcileError;

/// Position of a step in a [`SeedPlan`]; filled with an id once reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(usize);

impl Slot {
    pub fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for Slot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One reconciliation to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedStep {
    pub kind: EntityKind,
    pub key: NaturalKey,
    pub payload: Values,
    pub parent: Option<Slot>,
}

/// Ordered list of seed steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPlan {
    steps: Vec<SeedStep>,
}

impl SeedPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    ///
    /// Rejects a missing parent for parent-scoped kinds (`Dependency`), and a
    /// parent slot that is not yet in the plan, has the wrong kind, or is
    /// given to a globally keyed kind (`Validation`).
    pub fn push(
        &mut self,
        kind: EntityKind,
        key: NaturalKey,
        payload: Values,
        parent: Option<Slot>,
    ) -> Result<Slot, ReconcileError> {
        match (kind.parent(), parent) {
            (None, None) => {}
            (None, Some(slot)) => {
                return Err(ReconcileError::validation(format!(
                    "{kind} takes no parent, got slot {slot}"
                )));
            }
            (Some(expected), None) => {
                return Err(ReconcileError::Dependency {
                    kind,
                    parent: expected,
                });
            }
            (Some(expected), Some(slot)) => {
                let Some(parent_step) = self.steps.get(slot.0) else {
                    return Err(ReconcileError::validation(format!(
                        "parent slot {slot} of {kind} is not in the plan yet"
                    )));
                };
                if parent_step.kind != expected {
                    return Err(ReconcileError::validation(format!(
                        "{kind} needs a {expected} parent, slot {slot} holds a {}",
                        parent_step.kind
                    )));
                }
            }
        }

        let slot = Slot(self.steps.len());
        self.steps.push(SeedStep {
            kind,
            key,
            payload,
            parent,
        });
        Ok(slot)
    }

    /// Append a user keyed by Telegram id.
    pub fn user(&mut self, telegram_id: i64, payload: Values) -> Slot {
        let slot = Slot(self.steps.len());
        self.steps.push(SeedStep {
            kind: EntityKind::User,
            key: NaturalKey::one(telegram_id),
            payload,
            parent: None,
        });
        slot
    }

    /// Append a project owned by the user in `owner`.
    pub fn project(
        &mut self,
        owner: Slot,
        name: impl Into<String>,
        payload: Values,
    ) -> Result<Slot, ReconcileError> {
        self.push(
            EntityKind::Project,
            NaturalKey::one(name.into()),
            payload,
            Some(owner),
        )
    }

    /// Append a competitor tracked by the project in `project`.
    pub fn competitor(
        &mut self,
        project: Slot,
        username: impl Into<String>,
        payload: Values,
    ) -> Result<Slot, ReconcileError> {
        self.push(
            EntityKind::Competitor,
            NaturalKey::one(username.into()),
            payload,
            Some(project),
        )
    }

    pub fn steps(&self) -> &[SeedStep] {
        &self.steps
    }

    pub fn step(&self, slot: Slot) -> Option<&SeedStep> {
        self.steps.get(slot.0)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps of a kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.steps.iter().filter(|s| s.kind == kind).count()
    }
}
