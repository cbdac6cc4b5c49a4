//! Configuration loading.
//!
//! Credentials, the username table and client settings come from a TOML or
//! YAML file layered under `FERRY_`-prefixed environment variables, e.g.
//! `FERRY_SOURCE__TOKEN` overrides `source.token`.
//!
//! ```toml
//! timeout_secs = 30
//!
//! [source]
//! url = "https://gitlab.example.com"
//! token = "glpat-..."
//!
//! [destination]
//! token = "ghp_..."
//!
//! [usernames]
//! jdoe = "john-doe"
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{MigrationError, Result};
use crate::github::DEFAULT_API_URL;
use crate::types::{MigrationOptions, ProvenanceLabel};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FERRY";

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_NAME: &str = "ferry";

/// `FERRY_<SECTION>__<KEY>`: one underscore after the prefix, two between
/// nested keys.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_source_name() -> String {
    "gitlab".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_true() -> bool {
    true
}

/// Source tracker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSettings {
    /// Instance URL, e.g. `https://gitlab.com`.
    pub url: String,
    /// Personal access token.
    pub token: String,
    /// Short name used in linkbacks and citations.
    #[serde(default = "default_source_name")]
    pub name: String,
}

/// Destination tracker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DestinationSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: String,
}

/// Full tool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FerryConfig {
    pub source: SourceSettings,
    pub destination: DestinationSettings,

    /// Source username to destination username.
    #[serde(default)]
    pub usernames: HashMap<String, String>,

    /// Attach the provenance label to migrated issues.
    #[serde(default = "default_true")]
    pub tag_provenance: bool,

    #[serde(default)]
    pub provenance_label: ProvenanceLabel,

    /// Per-request timeout for both clients.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FerryConfig {
    /// Load from `path` (or `./ferry.{toml,yaml,...}` if present) plus the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, environment())
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let config: Self = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check the settings that would otherwise only fail mid-run.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("source.url", &self.source.url),
            ("destination.api_url", &self.destination.api_url),
        ] {
            Url::parse(value)
                .map_err(|e| MigrationError::InvalidConfig(format!("{field}: {e}")))?;
        }

        if self.source.token.trim().is_empty() {
            return Err(MigrationError::InvalidConfig(
                "source.token must not be empty".to_string(),
            ));
        }
        if self.destination.token.trim().is_empty() {
            return Err(MigrationError::InvalidConfig(
                "destination.token must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(MigrationError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Migration options derived from this configuration.
    pub fn options(&self) -> MigrationOptions {
        let options = MigrationOptions::default()
            .with_source_name(self.source.name.clone())
            .with_provenance_label(self.tag_provenance.then(|| self.provenance_label.clone()));

        self.usernames
            .iter()
            .fold(options, |options, (from, to)| {
                options.with_user_mapping(from.clone(), to.clone())
            })
    }
}
