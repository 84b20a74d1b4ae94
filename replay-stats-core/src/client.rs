//! `reqwest` implementation of [`ReplayApi`] for the ballchasing.com API.
//!
//! Every request carries the token as a bare `Authorization` header, which is what the
//! service expects. Responses are mapped onto [`ApiError`] by status before decoding.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ApiSettings;
use crate::contract::{GroupInfo, ReplayApi, ReplayPage};
use crate::error::ApiError;

pub struct BallchasingClient {
    http: reqwest::Client,
    base_url: Url,
    page_size: u32,
}

impl BallchasingClient {
    pub fn new(token: &str, api: &ApiSettings) -> Result<Self, ApiError> {
        let mut auth = HeaderValue::from_str(token.trim()).map_err(|e| {
            error!(error = ?e, "Token cannot be sent as an Authorization header");
            ApiError::Unauthorized(format!("token is not a valid header value: {e}"))
        })?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(api.timeout())
            .user_agent(concat!("replay-stats/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let base_url = Url::parse(&api.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url {:?}: {e}", api.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Transport(format!(
                "base url {:?} cannot carry a path",
                api.base_url
            )));
        }

        info!(
            base_url = %base_url,
            page_size = api.page_size,
            timeout_secs = api.timeout_secs,
            token_set = !token.is_empty(),
            "Initialized BallchasingClient"
        );
        Ok(Self {
            http,
            base_url,
            page_size: api.page_size,
        })
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `{base}/replays?group=<id>&count=<page_size>`.
    fn first_page_url(&self, group_id: &str) -> Url {
        let mut url = self.endpoint(&["replays"]);
        url.query_pairs_mut()
            .append_pair("group", group_id)
            .append_pair("count", &self.page_size.to_string());
        url
    }

    /// The listing's `next` link, accepted only on the service's own origin so the token is
    /// never sent elsewhere.
    fn next_page_url(&self, next: &str) -> Result<Url, ApiError> {
        let url = Url::parse(next)
            .map_err(|e| ApiError::Decode(format!("invalid next page url {next:?}: {e}")))?;
        if url.origin() != self.base_url.origin() {
            error!(next, base_url = %self.base_url, "Next page url points at another origin");
            return Err(ApiError::Decode(format!(
                "next page url {next:?} is not on {}",
                self.base_url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, resource: &str) -> Result<T, ApiError> {
        debug!(url = %url, resource, "GET");
        let resp = self.http.get(url.clone()).send().await.map_err(|e| {
            error!(error = ?e, url = %url, "Request to replay service failed");
            ApiError::Transport(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to read response body>"));
            let err = classify_status(status, retry_after, resource, body);
            error!(status = %status, url = %url, error = %err, "Replay service returned error");
            return Err(err);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            error!(error = ?e, url = %url, "Failed to decode replay service response");
            ApiError::Decode(format!("{resource}: {e}"))
        })
    }
}

#[async_trait]
impl ReplayApi for BallchasingClient {
    async fn fetch_group(&self, group_id: &str) -> Result<GroupInfo, ApiError> {
        let url = self.endpoint(&["groups", group_id]);
        self.get_json(url, &format!("group {group_id}")).await
    }

    async fn list_replays(
        &self,
        group_id: &str,
        next: Option<String>,
    ) -> Result<ReplayPage, ApiError> {
        let url = match next {
            Some(next) => self.next_page_url(&next)?,
            None => self.first_page_url(group_id),
        };
        self.get_json(url, &format!("replays of group {group_id}"))
            .await
    }

    async fn fetch_replay(&self, replay_id: &str) -> Result<serde_json::Value, ApiError> {
        let url = self.endpoint(&["replays", replay_id]);
        self.get_json(url, &format!("replay {replay_id}")).await
    }
}

/// Maps a non-success status onto the error taxonomy.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    resource: &str,
    body: String,
) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::Unauthorized(format!("{resource}: {status}"))
        }
        StatusCode::NOT_FOUND => ApiError::NotFound(resource.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { retry_after },
        other => ApiError::Status {
            status: other.as_u16(),
            body,
        },
    }
}

/// `Retry-After` in its delay-seconds form; HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
