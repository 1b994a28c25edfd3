use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clubseed_infra::config::SeedConfig;
use clubseed_infra::store::PostgresStore;
use clubseed_observability::LogFormat;

fn main() -> ExitCode {
    let format = LogFormat::from_env().unwrap_or_else(|err| {
        eprintln!("{err}; falling back to json");
        LogFormat::Json
    });
    clubseed_observability::init(format);

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("seed failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = SeedConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting seed");

    let manifest = clubseed_cli::load_manifest(config.manifest_path.as_deref())?;

    let store = PostgresStore::connect(&config).context("failed to connect to the database")?;
    store.ensure_schema().context("failed to prepare schema")?;

    let outcome = clubseed_cli::seed(&store, &manifest);
    store.close(Duration::from_secs(5));

    let report = outcome?;
    tracing::info!(
        created = report.total_created(),
        existing = report.total_existing(),
        "seed finished"
    );
    Ok(())
}
