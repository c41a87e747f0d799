use std::time::Duration;

use async_trait::async_trait;
use ccal_core::{ContestDraft, Platform};
use ccal_storage::HttpFetcher;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{collect_valid, window_from_seconds, AdapterContext, AdapterError, ContestAdapter, SourceConfig};

const NOT_STARTED_PHASE: &str = "BEFORE";

#[derive(Debug, Deserialize)]
struct ContestListResponse {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    result: Vec<ContestListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContestListEntry {
    id: u64,
    name: String,
    phase: String,
    duration_seconds: i64,
    #[serde(default)]
    start_time_seconds: Option<i64>,
}

/// Maps `contest.list` output; only contests still in the `BEFORE` phase are kept.
pub fn parse_codeforces(
    value: JsonValue,
    now: DateTime<Utc>,
) -> Result<Vec<ContestDraft>, AdapterError> {
    let response: ContestListResponse = serde_json::from_value(value).map_err(AdapterError::schema)?;
    if response.status != "OK" {
        return Err(AdapterError::Upstream(
            response.comment.unwrap_or(response.status),
        ));
    }

    let drafts = response
        .result
        .into_iter()
        .filter(|c| c.phase == NOT_STARTED_PHASE)
        .filter_map(|c| {
            let start_seconds = c.start_time_seconds?;
            let window = window_from_seconds(&c.name, start_seconds, c.duration_seconds);
            Some(window.and_then(|(start, end)| {
                ContestDraft::new(
                    c.name,
                    Platform::Codeforces,
                    start,
                    end,
                    format!("https://codeforces.com/contest/{}", c.id),
                    now,
                )
            }))
        });
    Ok(collect_valid(Platform::Codeforces.source_id(), drafts))
}

#[derive(Debug, Clone)]
pub struct CodeforcesAdapter {
    config: SourceConfig,
}

impl CodeforcesAdapter {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContestAdapter for CodeforcesAdapter {
    fn platform(&self) -> Platform {
        Platform::Codeforces
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<ContestDraft>, AdapterError> {
        let value: JsonValue = http
            .get_json(&self.config.source_id, &self.config.endpoint, &[("gym", "false".to_string())])
            .await?;
        parse_codeforces(value, ctx.now)
    }
}
