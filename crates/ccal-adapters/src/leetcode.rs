use std::time::Duration;

use async_trait::async_trait;
use ccal_core::{ContestDraft, Platform};
use ccal_storage::HttpFetcher;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::{collect_valid, window_from_seconds, AdapterContext, AdapterError, ContestAdapter, SourceConfig};

pub const LEETCODE_UPCOMING_QUERY: &str =
    "{ upcomingContests { title titleSlug startTime duration } }";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<UpcomingData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpcomingData {
    upcoming_contests: Vec<UpcomingContest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpcomingContest {
    title: String,
    title_slug: String,
    start_time: i64,
    duration: i64,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// Maps the `upcomingContests` query; the feed already holds only contests that have not started.
pub fn parse_leetcode(
    value: JsonValue,
    now: DateTime<Utc>,
) -> Result<Vec<ContestDraft>, AdapterError> {
    let response: GraphqlResponse = serde_json::from_value(value).map_err(AdapterError::schema)?;
    if let Some(first) = response.errors.first() {
        return Err(AdapterError::Upstream(first.message.clone()));
    }
    let data = response
        .data
        .ok_or_else(|| AdapterError::Schema("graphql response has no data".into()))?;

    let drafts = data.upcoming_contests.into_iter().map(|c| {
        let (start, end) = window_from_seconds(&c.title, c.start_time, c.duration)?;
        ContestDraft::new(
            c.title,
            Platform::LeetCode,
            start,
            end,
            format!("https://leetcode.com/contest/{}", c.title_slug),
            now,
        )
    });
    Ok(collect_valid(Platform::LeetCode.source_id(), drafts))
}

#[derive(Debug, Clone)]
pub struct LeetCodeAdapter {
    config: SourceConfig,
}

impl LeetCodeAdapter {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContestAdapter for LeetCodeAdapter {
    fn platform(&self) -> Platform {
        Platform::LeetCode
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<ContestDraft>, AdapterError> {
        let body = json!({ "query": LEETCODE_UPCOMING_QUERY });
        let value: JsonValue = http
            .post_json(&self.config.source_id, &self.config.endpoint, &body)
            .await?;
        parse_leetcode(value, ctx.now)
    }
}
