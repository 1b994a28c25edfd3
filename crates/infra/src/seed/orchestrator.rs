//! Sequential evaluation of a [`SeedPlan`].
//!
//! Steps run in plan order. Each reconciled id is written to the step's slot;
//! a child whose parent slot is still empty is rejected with
//! `ReconcileError::Dependency` instead of reaching the store.
//!
//! The first failing step stops the run. Rows reconciled before it stay in
//! the store (there is no batch transaction); running the same plan again
//! finds them and only creates what is still missing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};

use clubseed_core::{EntityId, EntityKind, NaturalKey};

use super::plan::{SeedPlan, Slot};
use crate::reconcile::{ReconcileError, Reconciler};
use crate::store::Store;

/// Created / already-present counts for one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindTally {
    pub created: usize,
    pub existing: usize,
}

/// What a (possibly partial) seed run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    tallies: BTreeMap<EntityKind, KindTally>,
    slots: Vec<Option<EntityId>>,
}

impl SeedReport {
    fn new(steps: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            tallies: BTreeMap::new(),
            slots: vec![None; steps],
        }
    }

    pub fn tally(&self, kind: EntityKind) -> KindTally {
        self.tallies.get(&kind).copied().unwrap_or_default()
    }

    pub fn created(&self, kind: EntityKind) -> usize {
        self.tally(kind).created
    }

    pub fn existing(&self, kind: EntityKind) -> usize {
        self.tally(kind).existing
    }

    pub fn total_created(&self) -> usize {
        self.tallies.values().map(|t| t.created).sum()
    }

    pub fn total_existing(&self) -> usize {
        self.tallies.values().map(|t| t.existing).sum()
    }

    /// Identifier reconciled for a slot, `None` if the run never got there.
    pub fn id(&self, slot: Slot) -> Option<EntityId> {
        self.slots.get(slot.index()).copied().flatten()
    }

    /// Number of steps that completed.
    pub fn completed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// A step failed; carries the partial report up to that step.
#[derive(Debug, Error)]
#[error("seed step {step} ({kind} {key}) failed")]
pub struct SeedError {
    pub step: usize,
    pub kind: EntityKind,
    pub key: NaturalKey,
    #[source]
    pub source: ReconcileError,
    pub report: Box<SeedReport>,
}

/// Runs seed plans against a store.
#[derive(Debug, Clone)]
pub struct Orchestrator<S> {
    reconciler: Reconciler<S>,
}

impl<S> Orchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            reconciler: Reconciler::new(store),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }
}

impl<S: Store> Orchestrator<S> {
    /// Reconcile every step in order, stopping at the first failure.
    #[instrument(skip_all, fields(steps = plan.len()))]
    pub fn run(&self, plan: &SeedPlan) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::new(plan.len());

        for (index, step) in plan.steps().iter().enumerate() {
            let outcome = Self::parent_id(&report, step.kind, step.parent).and_then(|parent| {
                self.reconciler
                    .resolve(step.kind, &step.key, &step.payload, parent)
            });

            match outcome {
                Ok(reconciled) => {
                    report.slots[index] = Some(reconciled.id);
                    let tally = report.tallies.entry(step.kind).or_default();
                    if reconciled.created {
                        tally.created += 1;
                    } else {
                        tally.existing += 1;
                    }
                }
                Err(source) => {
                    report.finished_at = Some(Utc::now());
                    error!(
                        step = index,
                        kind = %step.kind,
                        key = %step.key,
                        completed = report.completed(),
                        error = %source,
                        "seed run aborted"
                    );
                    return Err(SeedError {
                        step: index,
                        kind: step.kind,
                        key: step.key.clone(),
                        source,
                        report: Box::new(report),
                    });
                }
            }
        }

        report.finished_at = Some(Utc::now());
        info!(
            created = report.total_created(),
            existing = report.total_existing(),
            "seed run complete"
        );
        Ok(report)
    }

    fn parent_id(
        report: &SeedReport,
        kind: EntityKind,
        parent: Option<Slot>,
    ) -> Result<Option<EntityId>, ReconcileError> {
        let Some(slot) = parent else {
            return Ok(None);
        };
        // Plans only reference earlier slots and a failed step ends the run,
        // so this re-checks what `SeedPlan::push` already enforces.
        report
            .id(slot)
            .map(Some)
            .ok_or(ReconcileError::Dependency {
                kind,
                parent: kind.parent().unwrap_or(kind),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use clubseed_core::Values;

    use crate::store::{InMemoryStore, StoreError};

    const USERNAMES: [&str; 7] = [
        "ace.padel",
        "bandeja",
        "chiquita",
        "drive",
        "el_muro",
        "fondo",
        "globo",
    ];

    fn plan_with_competitors(usernames: &[&str]) -> (SeedPlan, Slot, Slot) {
        let mut plan = SeedPlan::new();
        let user = plan.user(3003, Values::new().with("username", "club_owner"));
        let project = plan.project(user, "X", Values::new()).unwrap();
        for name in usernames {
            plan.competitor(project, *name, Values::new()).unwrap();
        }
        (plan, user, project)
    }

    fn setup() -> (Orchestrator<Arc<InMemoryStore>>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Orchestrator::new(store.clone()), store)
    }

    #[test]
    fn empty_store_creates_everything() {
        let (orchestrator, store) = setup();
        let (plan, user, project) = plan_with_competitors(&USERNAMES);

        let report = orchestrator.run(&plan).unwrap();

        assert_eq!(report.created(EntityKind::User), 1);
        assert_eq!(report.created(EntityKind::Project), 1);
        assert_eq!(report.created(EntityKind::Competitor), 7);
        assert_eq!(store.insert_count(), 9);
        assert!(report.id(user).is_some());
        assert!(report.id(project).is_some());
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn rerun_creates_nothing_and_returns_same_ids() {
        let (orchestrator, store) = setup();
        let (plan, user, project) = plan_with_competitors(&USERNAMES);

        let first = orchestrator.run(&plan).unwrap();
        store.reset_counts();
        let second = orchestrator.run(&plan).unwrap();

        assert_eq!(store.insert_count(), 0);
        assert_eq!(second.total_created(), 0);
        assert_eq!(second.existing(EntityKind::Competitor), 7);
        assert_eq!(second.id(user), first.id(user));
        assert_eq!(second.id(project), first.id(project));
    }

    #[test]
    fn partially_seeded_store_only_gets_the_missing_rows() {
        let (orchestrator, store) = setup();
        let (partial, _, _) = plan_with_competitors(&USERNAMES[..4]);
        orchestrator.run(&partial).unwrap();
        store.reset_counts();

        let (full, _, _) = plan_with_competitors(&USERNAMES);
        let report = orchestrator.run(&full).unwrap();

        assert_eq!(store.insert_count(), 3);
        assert_eq!(report.created(EntityKind::Competitor), 3);
        assert_eq!(report.existing(EntityKind::Competitor), 4);
        assert_eq!(store.row_count("competitors"), 7);
    }

    #[test]
    fn store_failure_aborts_and_keeps_earlier_rows() {
        let (orchestrator, store) = setup();
        let (plan, user, _) = plan_with_competitors(&USERNAMES);

        // user + project + 2 competitors succeed, the third competitor fails.
        store.fail_inserts_after(4);
        let err = orchestrator.run(&plan).unwrap_err();

        assert_eq!(err.step, 4);
        assert_eq!(err.kind, EntityKind::Competitor);
        assert!(matches!(err.source, ReconcileError::Store(StoreError::Connection(_))));
        assert_eq!(err.report.completed(), 4);
        assert!(err.report.id(user).is_some());
        assert_eq!(store.row_count("competitors"), 2);
        // Nothing after the failing step was attempted.
        assert_eq!(store.insert_count(), 5);

        // Re-running resumes where the failed run stopped.
        store.fail_inserts_after(usize::MAX);
        store.reset_counts();
        let report = orchestrator.run(&plan).unwrap();
        assert_eq!(report.created(EntityKind::Competitor), 5);
        assert_eq!(report.existing(EntityKind::Competitor), 2);
        assert_eq!(report.existing(EntityKind::User), 1);
        assert_eq!(store.insert_count(), 5);
    }

    #[test]
    fn read_failure_aborts_without_inserting() {
        let (orchestrator, store) = setup();
        let (plan, _, _) = plan_with_competitors(&USERNAMES);
        orchestrator.run(&plan).unwrap();
        store.reset_counts();

        store.fail_selects(true);
        let err = orchestrator.run(&plan).unwrap_err();

        assert_eq!(err.step, 0);
        assert_eq!(err.kind, EntityKind::User);
        assert!(matches!(err.source, ReconcileError::Store(StoreError::Connection(_))));
        assert_eq!(err.report.completed(), 0);
        assert_eq!(store.select_count(), 1);
        assert_eq!(store.insert_count(), 0);
        assert_eq!(store.row_count("users"), 1);
    }

    #[test]
    fn validation_failure_mid_plan_stops_the_run() {
        let (orchestrator, store) = setup();
        let mut plan = SeedPlan::new();
        let user = plan.user(3003, Values::new());
        let project = plan.project(user, "X", Values::new()).unwrap();
        plan.competitor(project, "ace.padel", Values::new()).unwrap();
        plan.competitor(project, "   ", Values::new()).unwrap();
        plan.competitor(project, "globo", Values::new()).unwrap();

        let err = orchestrator.run(&plan).unwrap_err();
        assert_eq!(err.step, 3);
        assert!(matches!(err.source, ReconcileError::Validation(_)));
        assert_eq!(store.row_count("competitors"), 1);
    }

    #[test]
    fn report_serializes_with_kind_names() {
        let (orchestrator, _store) = setup();
        let (plan, _, _) = plan_with_competitors(&USERNAMES[..1]);
        let report = orchestrator.run(&plan).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tallies"]["competitor"]["created"], 1);
        assert_eq!(json["tallies"]["user"]["existing"], 0);
    }
}
