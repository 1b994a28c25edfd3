//! Seeder entry points shared by the `clubseed` binary and its tests.

use std::path::Path;

use anyhow::Context;
use clubseed_core::EntityKind;
use clubseed_infra::seed::{Orchestrator, SeedManifest, SeedReport};
use clubseed_infra::store::Store;

/// Manifest used when no `CLUBSEED_MANIFEST` is configured.
pub const DEFAULT_MANIFEST: &str = include_str!("default_manifest.json");

/// Load the manifest at `path`, or the built-in one.
pub fn load_manifest(path: Option<&Path>) -> anyhow::Result<SeedManifest> {
    match path {
        Some(path) => SeedManifest::from_path(path)
            .with_context(|| format!("failed to load manifest {}", path.display())),
        None => SeedManifest::from_json_str(DEFAULT_MANIFEST)
            .context("built-in manifest is invalid"),
    }
}

/// Compile the manifest and reconcile it against `store`.
pub fn seed<S: Store>(store: S, manifest: &SeedManifest) -> anyhow::Result<SeedReport> {
    let plan = manifest.compile().context("failed to compile manifest")?;
    tracing::info!(
        users = plan.count(EntityKind::User),
        projects = plan.count(EntityKind::Project),
        competitors = plan.count(EntityKind::Competitor),
        "seed plan compiled"
    );

    let report = Orchestrator::new(store).run(&plan).map_err(|err| {
        tracing::warn!(
            completed = err.report.completed(),
            created = err.report.total_created(),
            "partial seed applied; re-run to resume"
        );
        anyhow::Error::new(err)
    })?;

    for kind in EntityKind::ALL {
        let tally = report.tally(kind);
        tracing::info!(
            kind = %kind,
            created = tally.created,
            existing = tally.existing,
            "seed summary"
        );
    }
    Ok(report)
}
