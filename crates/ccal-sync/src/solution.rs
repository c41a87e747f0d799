//! Solution video lookup.
//!
//! [`SolutionFinder`] turns a finished contest into one [`SearchRequest`] and
//! asks a [`VideoSearch`] backend for the newest matching video. Backend
//! failures are logged and reported as "no match" so callers never abort on them.

use std::sync::Arc;

use async_trait::async_trait;
use ccal_core::Platform;
use ccal_storage::{FetchError, HttpFetcher};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TrustedChannels;

pub const YOUTUBE_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

const SEARCH_SOURCE_ID: &str = "youtube";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("video search is not configured: {0}")]
    NotConfigured(&'static str),
}

/// One video search, already scoped to what the backend should return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    /// Only videos published strictly after this instant qualify.
    pub published_after: DateTime<Utc>,
    pub channel_id: Option<String>,
    pub max_results: u32,
}

impl SearchRequest {
    pub fn for_contest(name: &str, end_time: DateTime<Utc>, channel_id: Option<&str>) -> Self {
        Self {
            query: format!("{name} solution | editorial"),
            published_after: end_time,
            channel_id: channel_id.map(str::to_string),
            max_results: 1,
        }
    }
}

/// Backend answering a [`SearchRequest`] with the id of the most recently published match.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Option<String>, SearchError>;
}

/// What the lifecycle engine and the backfill pass need from the finder.
#[async_trait]
pub trait SolutionLookup: Send + Sync {
    async fn find(
        &self,
        contest_name: &str,
        end_time: DateTime<Utc>,
        platform: Platform,
    ) -> Option<String>;

    /// Platforms whose searches are restricted to a trusted channel.
    fn trusted_platforms(&self) -> Vec<Platform>;
}

pub struct SolutionFinder {
    search: Arc<dyn VideoSearch>,
    channels: TrustedChannels,
}

impl SolutionFinder {
    pub fn new(search: Arc<dyn VideoSearch>, channels: TrustedChannels) -> Self {
        Self { search, channels }
    }

    pub fn request_for(
        &self,
        contest_name: &str,
        end_time: DateTime<Utc>,
        platform: Platform,
    ) -> SearchRequest {
        SearchRequest::for_contest(contest_name, end_time, self.channels.channel_for(platform))
    }
}

#[async_trait]
impl SolutionLookup for SolutionFinder {
    async fn find(
        &self,
        contest_name: &str,
        end_time: DateTime<Utc>,
        platform: Platform,
    ) -> Option<String> {
        let request = self.request_for(contest_name, end_time, platform);
        match self.search.search(&request).await {
            Ok(Some(video_id)) => {
                debug!(contest = contest_name, %platform, video_id = %video_id, "solution video found");
                Some(video_id)
            }
            Ok(None) => {
                debug!(contest = contest_name, %platform, "no solution video yet");
                None
            }
            Err(err) => {
                warn!(contest = contest_name, %platform, error = %err, "solution search failed");
                None
            }
        }
    }

    fn trusted_platforms(&self) -> Vec<Platform> {
        self.channels.platforms()
    }
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchResultId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultId {
    #[serde(default)]
    video_id: Option<String>,
}

/// YouTube Data API `search.list` backend.
pub struct YouTubeSearch {
    http: Arc<HttpFetcher>,
    api_key: Option<String>,
    endpoint: String,
}

impl YouTubeSearch {
    pub fn new(http: Arc<HttpFetcher>, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            endpoint: YOUTUBE_SEARCH_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Query parameters for `search.list`, newest first.
pub fn youtube_query(request: &SearchRequest, api_key: &str) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("part", "snippet".to_string()),
        ("type", "video".to_string()),
        ("order", "date".to_string()),
        ("maxResults", request.max_results.to_string()),
        ("q", request.query.clone()),
        (
            "publishedAfter",
            request
                .published_after
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("key", api_key.to_string()),
    ];
    if let Some(channel_id) = &request.channel_id {
        query.push(("channelId", channel_id.clone()));
    }
    query
}

#[async_trait]
impl VideoSearch for YouTubeSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Option<String>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SearchError::NotConfigured("YOUTUBE_API_KEY is unset"))?;
        let response: SearchListResponse = self
            .http
            .get_json(SEARCH_SOURCE_ID, &self.endpoint, &youtube_query(request, api_key))
            .await?;
        Ok(response.items.into_iter().find_map(|item| item.id.video_id))
    }
}
