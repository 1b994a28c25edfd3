//! Infrastructure layer: stores, reconciliation, seeding and config.

pub mod config;
pub mod reconcile;
pub mod seed;
pub mod store;

pub use config::{ConfigError, SeedConfig};
pub use reconcile::{Reconciled, ReconcileError, Reconciler};
pub use seed::{Orchestrator, SeedError, SeedManifest, SeedPlan, SeedReport};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError};
