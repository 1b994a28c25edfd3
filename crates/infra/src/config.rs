//! Configuration loading and representation.
//!
//! Read once at startup and passed explicitly into the store and the seed
//! entry point; nothing below this module reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MANIFEST_PATH: &str = "CLUBSEED_MANIFEST";
pub const ACQUIRE_TIMEOUT_SECS: &str = "CLUBSEED_ACQUIRE_TIMEOUT_SECS";
pub const MAX_CONNECTIONS: &str = "CLUBSEED_MAX_CONNECTIONS";

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONNECTIONS: u32 = 1;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Seeder configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedConfig {
    /// Store connection string.
    pub database_url: String,
    /// Manifest file to seed from; the built-in manifest when `None`.
    pub manifest_path: Option<PathBuf>,
    pub acquire_timeout: Duration,
    pub max_connections: u32,
}

impl SeedConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            manifest_path: None,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let database_url = get(DATABASE_URL).ok_or(ConfigError::Missing(DATABASE_URL))?;
        let mut config = Self::new(database_url.trim());

        config.manifest_path = get(MANIFEST_PATH).map(PathBuf::from);

        if let Some(raw) = get(ACQUIRE_TIMEOUT_SECS) {
            let secs = parse_positive(ACQUIRE_TIMEOUT_SECS, &raw)?;
            config.acquire_timeout = Duration::from_secs(secs.into());
        }
        if let Some(raw) = get(MAX_CONNECTIONS) {
            config.max_connections = parse_positive(MAX_CONNECTIONS, &raw)?;
        }

        Ok(config)
    }
}

impl core::fmt::Debug for SeedConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Connection strings usually carry credentials.
        f.debug_struct("SeedConfig")
            .field("database_url", &"<redacted>")
            .field("manifest_path", &self.manifest_path)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
