use std::time::Duration;

use async_trait::async_trait;
use ccal_core::{ContestDraft, Platform};
use ccal_storage::HttpFetcher;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::{collect_valid, parse_timestamp, AdapterContext, AdapterError, ContestAdapter, SourceConfig};

const UPCOMING_STATUS: &str = "UPCOMING";

#[derive(Debug, Deserialize)]
struct EventsResponse {
    response: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    title: String,
    status: String,
    start_utc_tz: String,
    end_utc_tz: String,
    url: String,
}

/// Maps the events feed, keeping entries whose status is `UPCOMING`.
///
/// Duration comes from the end minus start timestamps, truncated to whole seconds.
pub fn parse_hackerearth(
    value: JsonValue,
    now: DateTime<Utc>,
) -> Result<Vec<ContestDraft>, AdapterError> {
    let response: EventsResponse = serde_json::from_value(value).map_err(AdapterError::schema)?;
    let source_id = Platform::HackerEarth.source_id();

    let drafts = response
        .response
        .into_iter()
        .filter(|e| e.status == UPCOMING_STATUS)
        .filter_map(|e| {
            let (Some(start), Some(end)) = (parse_timestamp(&e.start_utc_tz), parse_timestamp(&e.end_utc_tz)) else {
                warn!(source_id, title = %e.title, "unparseable event timestamps");
                return None;
            };
            Some(ContestDraft::new(e.title, Platform::HackerEarth, start, end, e.url, now))
        });
    Ok(collect_valid(source_id, drafts))
}

#[derive(Debug, Clone)]
pub struct HackerEarthAdapter {
    config: SourceConfig,
}

impl HackerEarthAdapter {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContestAdapter for HackerEarthAdapter {
    fn platform(&self) -> Platform {
        Platform::HackerEarth
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
            .get_json(&self.config.source_id, &self.config.endpoint, &[])
            .await?;
        parse_hackerearth(value, ctx.now)
    }
}
