use std::time::Duration;

use async_trait::async_trait;
use ccal_core::{ContestDraft, Platform};
use ccal_storage::HttpFetcher;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::{collect_valid, parse_timestamp, AdapterContext, AdapterError, ContestAdapter, SourceConfig};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Challenge {
    id: String,
    name: String,
    start_date: String,
    end_date: String,
}

/// Maps active challenges, keeping only those whose start is still ahead of `now`.
///
/// The upstream `Active` filter also returns challenges already running, so
/// the start date is compared here.
pub fn parse_topcoder(
    value: JsonValue,
    now: DateTime<Utc>,
) -> Result<Vec<ContestDraft>, AdapterError> {
    let challenges: Vec<Challenge> = serde_json::from_value(value).map_err(AdapterError::schema)?;
    let source_id = Platform::TopCoder.source_id();

    let drafts = challenges.into_iter().filter_map(|c| {
        let (Some(start), Some(end)) = (parse_timestamp(&c.start_date), parse_timestamp(&c.end_date)) else {
            warn!(source_id, name = %c.name, "unparseable challenge dates");
            return None;
        };
        if start <= now {
            return None;
        }
        Some(ContestDraft::new(
            c.name,
            Platform::TopCoder,
            start,
            end,
            format!("https://www.topcoder.com/challenges/{}", c.id),
            now,
        ))
    });
    Ok(collect_valid(source_id, drafts))
}

#[derive(Debug, Clone)]
pub struct TopCoderAdapter {
    config: SourceConfig,
}

impl TopCoderAdapter {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContestAdapter for TopCoderAdapter {
    fn platform(&self) -> Platform {
        Platform::TopCoder
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<ContestDraft>, AdapterError> {
        let query = [
            ("status", "Active".to_string()),
            ("perPage", "100".to_string()),
            ("sortBy", "startDate".to_string()),
            ("sortOrder", "asc".to_string()),
        ];
        let value: JsonValue = http
            .get_json(&self.config.source_id, &self.config.endpoint, &query)
            .await?;
        parse_topcoder(value, ctx.now)
    }
}
