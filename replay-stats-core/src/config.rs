use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://ballchasing.com/api";
/// The service refuses larger pages.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Everything a collector run needs. Built by the caller; the pipeline never reads the
/// environment itself.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub credentials: Credentials,
    pub api: ApiSettings,
    pub retry: RetryPolicy,
    pub output: OutputConfig,
    pub on_fetch_failure: FetchFailurePolicy,
}

impl CollectConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api: ApiSettings::default(),
            retry: RetryPolicy::default(),
            output: OutputConfig::default(),
            on_fetch_failure: FetchFailurePolicy::default(),
        }
    }

    /// Rejects blank secrets and out-of-range settings.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CollectError;

        let c = &self.credentials;
        for (name, value) in [
            ("token", &c.token),
            ("group id", &c.group_id),
            ("player name", &c.player_name),
        ] {
            if value.trim().is_empty() {
                return Err(CollectError::Config(format!("{name} must not be empty")));
            }
        }
        if self.api.page_size == 0 || self.api.page_size > MAX_PAGE_SIZE {
            return Err(CollectError::Config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.api.page_size
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(CollectError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            group_id = %self.credentials.group_id,
            player = %self.credentials.player_name,
            summary_path = %self.output.summary_path.display(),
            output_dir = %self.output.output_dir.display(),
            on_fetch_failure = ?self.on_fetch_failure,
            "Loaded CollectConfig"
        );
        debug!(?self, "CollectConfig loaded (full debug)");
    }
}

/// The three secrets of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub group_id: String,
    pub player_name: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token_len", &self.token.len())
            .field("group_id", &self.group_id)
            .field("player_name", &self.player_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
            timeout_secs: 30,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bounded exponential backoff for throttled or transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub summary_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_path: PathBuf::from("summary.csv"),
            output_dir: PathBuf::from("stats"),
        }
    }
}

/// What to do when some replay details cannot be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchFailurePolicy {
    /// Fail the run and write nothing.
    #[default]
    Abort,
    /// Leave the failed replays out of both artifacts and carry on.
    Skip,
}
