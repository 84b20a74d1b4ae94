/// `load_config` module: turns an optional YAML settings file plus environment secrets into
/// the core crate's [`CollectConfig`].
///
/// This is the only place the environment is read. The YAML file holds non-secret settings
/// only; every section is optional and falls back to the core defaults. The three secrets
/// come from `BC_TOKEN`, `BC_GROUP_ID` and `BC_PLAYER_NAME`.
///
/// Accepted YAML:
///
/// ```yaml
/// api:
///   base_url: https://ballchasing.com/api
///   page_size: 200
///   timeout_secs: 30
/// retry:
///   max_attempts: 5
///   base_delay_ms: 1000
///   max_delay_ms: 30000
/// output:
///   summary_path: summary.csv
///   output_dir: stats
/// on_fetch_failure: abort   # or skip
/// ```
use anyhow::{Context, Result};
use replay_stats_core::config::{
    ApiSettings, CollectConfig, Credentials, FetchFailurePolicy, OutputConfig, RetryPolicy,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const TOKEN_VAR: &str = "BC_TOKEN";
pub const GROUP_VAR: &str = "BC_GROUP_ID";
pub const PLAYER_VAR: &str = "BC_PLAYER_NAME";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api: ApiSettings,
    pub retry: RetryPolicy,
    pub output: OutputConfig,
    pub on_fetch_failure: FetchFailurePolicy,
}

/// Reads and parses the YAML settings file.
pub fn read_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;

    // An empty file is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    let parsed: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path, "Parsed config YAML successfully");
    Ok(parsed)
}

fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            info!(var = key, "Found secret in environment");
            Ok(value)
        }
        Ok(_) => {
            error!(var = key, "Environment variable is empty");
            anyhow::bail!("{key} environment variable is empty")
        }
        Err(e) => {
            error!(error = ?e, var = key, "Environment variable not set");
            Err(e).with_context(|| format!("{key} environment variable not set"))
        }
    }
}

/// Loads the settings file (if any), injects the secrets from the environment and
/// validates the result.
pub fn load_config(path: Option<&Path>) -> Result<CollectConfig> {
    let file = match path {
        Some(path) => read_file_config(path)?,
        None => {
            info!("No config file given, using defaults");
            FileConfig::default()
        }
    };

    let credentials = Credentials {
        token: required_env(TOKEN_VAR)?,
        group_id: required_env(GROUP_VAR)?.trim().to_string(),
        player_name: required_env(PLAYER_VAR)?,
    };

    let config = CollectConfig {
        credentials,
        api: file.api,
        retry: file.retry,
        output: file.output,
        on_fetch_failure: file.on_fetch_failure,
    };
    config.validate().context("Invalid configuration")?;

    info!(
        group_id = %config.credentials.group_id,
        output_dir = %config.output.output_dir.display(),
        "Config loaded and merged successfully"
    );
    Ok(config)
}
