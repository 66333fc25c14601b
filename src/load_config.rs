//! `load_config` module: resolves the connection settings (project, region,
//! access token, API base URLs) used by the REST client.
//!
//! Sources, lowest precedence first:
//!   1. an optional YAML profile file,
//!   2. environment variables (`INTEGRATION_PROJECT`, `INTEGRATION_REGION`,
//!      `INTEGRATION_TOKEN`), including those loaded from `.env`,
//!   3. explicit command-line flags.
//!
//! Missing project, region or token is reported here, before any remote call.
//!
//! Example profile:
//!
//! ```yaml
//! project: my-project
//! region: us-central1
//! endpoints:
//!   integrations: http://localhost:8080/v1
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info};

pub const ENV_PROJECT: &str = "INTEGRATION_PROJECT";
pub const ENV_REGION: &str = "INTEGRATION_REGION";
pub const ENV_TOKEN: &str = "INTEGRATION_TOKEN";

/// API root overrides (everything before `/projects/...`), mainly for local emulators and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EndpointOverrides {
    pub integrations: Option<String>,
    pub connectors: Option<String>,
    pub storage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub project: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

/// Values given on the command line; they win over profile and environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub project: Option<String>,
    pub region: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone)]
pub struct ClientSettings {
    pub project: String,
    pub region: String,
    pub token: String,
    pub endpoints: EndpointOverrides,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("project", &self.project)
            .field("region", &self.region)
            .field("token", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<Profile> {
    let path_ref = path.as_ref();
    info!(profile_path = ?path_ref, "Loading profile from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, profile_path = ?path_ref, "Failed to read profile file");
            return Err(anyhow::anyhow!(
                "Failed to read profile file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str::<Option<Profile>>(&content) {
        Ok(profile) => {
            info!(profile_path = ?path_ref, "Parsed profile YAML successfully");
            Ok(profile.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, profile_path = ?path_ref, "Failed to parse profile YAML");
            Err(anyhow::anyhow!("Failed to parse profile YAML: {e}"))
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Merge profile, environment and command-line values into client settings.
pub fn load_settings(profile_path: Option<&Path>, overrides: SettingsOverrides) -> Result<ClientSettings> {
    let profile = match profile_path {
        Some(path) => load_profile(path)?,
        None => Profile::default(),
    };

    let project = overrides
        .project
        .or_else(|| env_value(ENV_PROJECT))
        .or(profile.project)
        .with_context(|| format!("project must be set with --proj, {ENV_PROJECT} or a profile"))?;
    let region = overrides
        .region
        .or_else(|| env_value(ENV_REGION))
        .or(profile.region)
        .with_context(|| format!("region must be set with --reg, {ENV_REGION} or a profile"))?;
    let token = overrides
        .token
        .or_else(|| env_value(ENV_TOKEN))
        .with_context(|| format!("access token must be set with --token or {ENV_TOKEN}"))?;

    let settings = ClientSettings {
        project,
        region,
        token,
        endpoints: profile.endpoints,
    };
    info!(project = %settings.project, region = %settings.region, "Client settings resolved");
    Ok(settings)
}
