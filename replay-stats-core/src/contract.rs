//! # contract: the seam between the pipeline and the replay service
//!
//! The collector talks to the replay-analysis service only through [`ReplayApi`]. The
//! production implementation is [`crate::client::BallchasingClient`]; tests use the
//! `mockall`-generated `MockReplayApi`, exported behind the `test-export-mocks` feature so
//! integration tests in `tests/` can use it too.
//!
//! Response types hold only the fields the pipeline reads. Replay details are kept as raw
//! [`serde_json::Value`] so the stats documents are written exactly as the service sent them.

use async_trait::async_trait;
use serde::Deserialize;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::ApiError;

/// The group record, fetched once to check the group exists and the token can read it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One page of the replay listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplayPage {
    #[serde(default, rename = "list")]
    pub replays: Vec<ReplaySummary>,
    /// Absolute URL of the following page, absent on the last one.
    #[serde(default)]
    pub next: Option<String>,
}

/// A replay as it appears in the listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplaySummary {
    pub id: String,
    #[serde(default)]
    pub replay_title: Option<String>,
}

/// Read access to a replay group.
///
/// Implementations perform exactly one request per call; retrying is the caller's job.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReplayApi: Send + Sync {
    /// Fetch the group record.
    async fn fetch_group(&self, group_id: &str) -> Result<GroupInfo, ApiError>;

    /// Fetch one page of replays in the group. `next` is the URL returned by the previous
    /// page, or `None` for the first page.
    async fn list_replays(
        &self,
        group_id: &str,
        next: Option<String>,
    ) -> Result<ReplayPage, ApiError>;

    /// Fetch the full statistics payload of one replay.
    async fn fetch_replay(&self, replay_id: &str) -> Result<serde_json::Value, ApiError>;
}
