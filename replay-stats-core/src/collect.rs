//! High-level pipeline: list a replay group, fetch each replay, write the run output.
//!
//! A run is one linear pass:
//!   1. fetch the group record (checks the token and that the group exists)
//!   2. follow the replay listing until there is no `next` page
//!   3. fetch every replay's details and keep the ones the tracked player played in
//!   4. write the summary table and one JSON document per kept replay
//!
//! Every request goes through [`crate::retry::with_retry`]. Nothing is written until step 3
//! has finished, so a run that fails early leaves the previous output untouched.
//!
//! # Error Handling
//! Auth and throttling failures end the run with the matching [`CollectError`], whichever
//! request hits them. A missing group ends it with [`CollectError::NotFound`].
//! Replays whose details cannot be fetched or decoded are collected and then handled
//! according to [`FetchFailurePolicy`].
//!
//! # Navigation
//! - Main entrypoint: [`collect`]
//! - Listing only: [`list_all_replays`]

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::config::{CollectConfig, FetchFailurePolicy};
use crate::contract::{ReplayApi, ReplaySummary};
use crate::error::{ApiError, CollectError, Result};
use crate::output::{self, is_safe_replay_id};
use crate::retry::{with_retry, GaveUp};
use crate::stats::{extract_player_row, SummaryRow};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectReport {
    pub group_id: String,
    pub group_name: String,
    /// Distinct replays in the group listing.
    pub listed: usize,
    /// Replays the tracked player played in; rows in the table and documents on disk.
    pub matched: usize,
    /// Replays left out under [`FetchFailurePolicy::Skip`].
    pub skipped: Vec<String>,
    pub summary_path: PathBuf,
    pub output_dir: PathBuf,
    pub summary_sha256: String,
}

/// Replays kept for output, plus the ids whose details could not be obtained.
#[derive(Debug, Default)]
struct Fetched {
    rows: Vec<SummaryRow>,
    documents: Vec<(String, serde_json::Value)>,
    failed: Vec<String>,
}

fn gave_up(err: GaveUp) -> CollectError {
    CollectError::from_api(err.error, err.attempts)
}

/// Runs the whole pipeline against `api`.
pub async fn collect<A>(config: &CollectConfig, api: &A) -> Result<CollectReport>
where
    A: ReplayApi + ?Sized,
{
    config.validate()?;
    config.trace_loaded();
    let group_id = config.credentials.group_id.as_str();

    info!(group_id, "[COLLECT] Starting collection");
    let group = with_retry(&config.retry, "fetch group", || api.fetch_group(group_id))
        .await
        .map_err(|e| {
            error!(group_id, error = %e.error, "[COLLECT][ERROR] Group lookup failed");
            gave_up(e)
        })?;
    info!(group_id, group_name = %group.name, "[COLLECT] Group found");

    let listed = list_all_replays(api, config).await?;
    info!(group_id, count = listed.len(), "Found {} replay(s) in group {}", listed.len(), group_id);

    let fetched = fetch_matching(api, config, &listed).await?;

    let mut skipped = Vec::new();
    if !fetched.failed.is_empty() {
        match config.on_fetch_failure {
            FetchFailurePolicy::Abort => {
                error!(failed = ?fetched.failed, "[COLLECT][ERROR] Replay fetches failed, aborting");
                return Err(CollectError::PartialFetch {
                    failed: fetched.failed,
                });
            }
            FetchFailurePolicy::Skip => {
                warn!(failed = ?fetched.failed, "[COLLECT] Skipping replays that could not be fetched");
                skipped = fetched.failed;
            }
        }
    }

    if fetched.rows.is_empty() {
        info!(group_id, "[COLLECT] No replays matched; writing header-only summary");
    }
    let summary_sha256 = output::write_run_output(&config.output, &fetched.rows, &fetched.documents)?;

    let report = CollectReport {
        group_id: group_id.to_string(),
        group_name: group.name,
        listed: listed.len(),
        matched: fetched.rows.len(),
        skipped,
        summary_path: config.output.summary_path.clone(),
        output_dir: config.output.output_dir.clone(),
        summary_sha256,
    };
    info!(
        listed = report.listed,
        matched = report.matched,
        skipped = report.skipped.len(),
        "[COLLECT] Collection complete"
    );
    Ok(report)
}

/// Every replay in the group, in listing order, following `next` until it runs out.
///
/// Ids repeated across pages are kept once. A `next` URL that was already requested ends
/// the listing.
pub async fn list_all_replays<A>(api: &A, config: &CollectConfig) -> Result<Vec<ReplaySummary>>
where
    A: ReplayApi + ?Sized,
{
    let group_id = config.credentials.group_id.as_str();
    let mut replays = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut visited = HashSet::new();
    let mut next: Option<String> = None;
    let mut page_no = 0usize;

    loop {
        page_no += 1;
        let page = with_retry(&config.retry, "list replays", || {
            api.list_replays(group_id, next.clone())
        })
        .await
        .map_err(|e| {
            error!(group_id, page = page_no, error = %e.error, "[COLLECT][ERROR] Listing replays failed");
            gave_up(e)
        })?;

        debug!(page = page_no, replays = page.replays.len(), has_next = page.next.is_some(), "Fetched listing page");
        for replay in page.replays {
            if seen_ids.insert(replay.id.clone()) {
                replays.push(replay);
            } else {
                warn!(replay_id = %replay.id, "Replay listed twice; keeping first occurrence");
            }
        }

        match page.next {
            Some(url) if !url.is_empty() => {
                if !visited.insert(url.clone()) {
                    warn!(next = %url, "Listing returned an already visited page; stopping");
                    break;
                }
                next = Some(url);
            }
            _ => break,
        }
    }

    Ok(replays)
}

async fn fetch_matching<A>(
    api: &A,
    config: &CollectConfig,
    listed: &[ReplaySummary],
) -> Result<Fetched>
where
    A: ReplayApi + ?Sized,
{
    let player = config.credentials.player_name.as_str();
    let mut fetched = Fetched::default();

    if let Some(bad) = listed.iter().find(|r| !is_safe_replay_id(&r.id)) {
        error!(replay_id = %bad.id, "[COLLECT][ERROR] Listing contains an unusable replay id");
        return Err(CollectError::InvalidReplayId(bad.id.clone()));
    }

    for summary in listed {
        let id = summary.id.as_str();
        let document = match with_retry(&config.retry, "fetch replay", || api.fetch_replay(id)).await {
            Ok(document) => document,
            Err(GaveUp {
                error: ApiError::Unauthorized(msg),
                ..
            }) => {
                error!(replay_id = id, "[COLLECT][ERROR] Token rejected while fetching replay");
                return Err(CollectError::Auth(msg));
            }
            Err(GaveUp {
                error: ApiError::RateLimited { .. },
                attempts,
            }) => {
                error!(replay_id = id, attempts, "[COLLECT][ERROR] Still rate limited after all attempts");
                return Err(CollectError::RateLimit { attempts });
            }
            Err(e) => {
                warn!(replay_id = id, attempts = e.attempts, error = %e.error, "Failed to fetch replay");
                fetched.failed.push(id.to_string());
                continue;
            }
        };

        match extract_player_row(&document, player) {
            Ok(Some(mut row)) => {
                if row.id != id {
                    debug!(replay_id = id, payload_id = %row.id, "Payload id differs from listing; using listing id");
                    row.id = id.to_string();
                }
                debug!(
                    replay_id = id,
                    title = summary.replay_title.as_deref().unwrap_or(""),
                    outcome = ?row.outcome,
                    "Replay matched tracked player"
                );
                fetched.rows.push(row);
                fetched.documents.push((id.to_string(), document));
            }
            Ok(None) => {
                debug!(replay_id = id, player, "Tracked player not in replay; leaving it out");
            }
            Err(e) => {
                warn!(replay_id = id, error = %e, "Replay payload could not be decoded");
                fetched.failed.push(id.to_string());
            }
        }
    }

    Ok(fetched)
}
