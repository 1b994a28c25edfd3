//! Seeding: manifest → plan → orchestrated reconciliation.

pub mod manifest;
pub mod orchestrator;
pub mod plan;

pub use manifest::{ManifestError, ProjectSeed, SeedManifest, UserSeed};
pub use orchestrator::{KindTally, Orchestrator, SeedError, SeedReport};
pub use plan::{SeedPlan, SeedStep, Slot};
