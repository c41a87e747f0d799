//! Platform adapter contracts and the four contest feed adapters.
//!
//! Each adapter turns one upstream feed into [`ContestDraft`]s. Adapters never
//! see each other: [`fetch_all`] runs them side by side, bounds each with its
//! own timeout and hands back one [`SourceOutcome`] per source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ccal_core::{ContestDraft, ContestError, Platform};
use ccal_storage::{FetchError, HttpFetcher};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

mod codeforces;
mod hackerearth;
mod leetcode;
mod topcoder;

pub use codeforces::{parse_codeforces, CodeforcesAdapter};
pub use hackerearth::{parse_hackerearth, HackerEarthAdapter};
pub use leetcode::{parse_leetcode, LeetCodeAdapter, LEETCODE_UPCOMING_QUERY};
pub use topcoder::{parse_topcoder, TopCoderAdapter};

pub const CRATE_NAME: &str = "ccal-adapters";

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    /// Instant the cycle started; "not yet started" filters compare against it.
    pub now: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            now,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream reported failure: {0}")]
    Upstream(String),
    #[error("unexpected response shape: {0}")]
    Schema(String),
}

impl AdapterError {
    pub(crate) fn schema(err: serde_json::Error) -> Self {
        AdapterError::Schema(err.to_string())
    }
}

/// One entry of `sources.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Video channel holding canonical solutions for this source, if one is known.
    #[serde(default)]
    pub trusted_channel: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SourceConfig {
    pub fn default_for(platform: Platform) -> Self {
        let endpoint = match platform {
            Platform::Codeforces => "https://codeforces.com/api/contest.list",
            Platform::LeetCode => "https://leetcode.com/graphql",
            Platform::HackerEarth => "https://www.hackerearth.com/chrome-extension/events/",
            Platform::TopCoder => "https://api.topcoder.com/v5/challenges",
        };
        Self {
            source_id: platform.source_id().to_string(),
            display_name: platform.as_str().to_string(),
            enabled: true,
            endpoint: endpoint.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            trusted_channel: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[async_trait]
pub trait ContestAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn source_id(&self) -> &str {
        self.platform().source_id()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_TIMEOUT_SECS)
    }

    /// Fetches the feed and returns the contests that have not started yet.
    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<ContestDraft>, AdapterError>;
}

pub fn adapter_for_source(config: &SourceConfig) -> Option<Arc<dyn ContestAdapter>> {
    let platform = Platform::from_source_id(&config.source_id)?;
    let adapter: Arc<dyn ContestAdapter> = match platform {
        Platform::Codeforces => Arc::new(CodeforcesAdapter::new(config.clone())),
        Platform::LeetCode => Arc::new(LeetCodeAdapter::new(config.clone())),
        Platform::HackerEarth => Arc::new(HackerEarthAdapter::new(config.clone())),
        Platform::TopCoder => Arc::new(TopCoderAdapter::new(config.clone())),
    };
    Some(adapter)
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: String,
    pub platform: Platform,
    pub result: Result<Vec<ContestDraft>, AdapterError>,
}

/// Runs every adapter concurrently; a failing or slow source only loses its own batch.
pub async fn fetch_all(
    adapters: &[Arc<dyn ContestAdapter>],
    http: &HttpFetcher,
    ctx: &AdapterContext,
) -> Vec<SourceOutcome> {
    let runs = adapters.iter().map(|adapter| async move {
        let limit = adapter.timeout();
        let result = match tokio::time::timeout(limit, adapter.fetch(http, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(limit)),
        };
        match &result {
            Ok(drafts) => info!(
                run_id = %ctx.run_id,
                source_id = adapter.source_id(),
                contests = drafts.len(),
                "source fetched"
            ),
            Err(err) => warn!(
                run_id = %ctx.run_id,
                source_id = adapter.source_id(),
                error = %err,
                "source skipped for this cycle"
            ),
        }
        SourceOutcome {
            source_id: adapter.source_id().to_string(),
            platform: adapter.platform(),
            result,
        }
    });
    join_all(runs).await
}

/// Keeps the drafts that validate and logs the ones that do not.
pub(crate) fn collect_valid(
    source_id: &str,
    drafts: impl IntoIterator<Item = Result<ContestDraft, ContestError>>,
) -> Vec<ContestDraft> {
    drafts
        .into_iter()
        .filter_map(|draft| match draft {
            Ok(draft) => Some(draft),
            Err(err) => {
                warn!(source_id, error = %err, "dropping malformed upstream contest");
                None
            }
        })
        .collect()
}

/// Start and end of a contest given as a unix start plus a length in seconds.
pub(crate) fn window_from_seconds(
    name: &str,
    start_seconds: i64,
    duration_seconds: i64,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ContestError> {
    let out_of_range = |field, value| ContestError::OutOfRange {
        name: name.to_string(),
        field,
        value,
    };
    let start = DateTime::from_timestamp(start_seconds, 0)
        .ok_or_else(|| out_of_range("start", start_seconds))?;
    let end = TimeDelta::try_seconds(duration_seconds)
        .and_then(|length| start.checked_add_signed(length))
        .ok_or_else(|| out_of_range("duration", duration_seconds))?;
    Ok((start, end))
}

/// Accepts RFC 3339 as well as `2026-10-17 15:30:00+00:00` and offset-less UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
