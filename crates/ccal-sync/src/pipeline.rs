use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ccal_adapters::ContestAdapter;
use ccal_core::{Clock, SystemClock};
use ccal_storage::{ContestStore, HttpClientConfig, HttpFetcher, StoreError, TokenBucketConfig};
use serde::Serialize;
use tracing::error;

use crate::backfill::{run_backfill, BackfillSummary};
use crate::config::{SourceRegistry, SyncConfig};
use crate::fetch::{run_fetch_cycle, FetchRunSummary};
use crate::lifecycle::{run_lifecycle_scan, LifecycleSummary};
use crate::scheduler::JobGuard;
use crate::solution::{SolutionFinder, SolutionLookup, YouTubeSearch};

#[derive(Debug, Clone, Default, Serialize)]
pub struct StartupSummary {
    pub fetch: Option<FetchRunSummary>,
    pub lifecycle: Option<LifecycleSummary>,
    pub backfill: Option<BackfillSummary>,
}

/// Everything the three jobs share, plus one overlap guard per job.
pub struct SyncPipeline {
    http: Arc<HttpFetcher>,
    adapters: Vec<Arc<dyn ContestAdapter>>,
    store: Arc<dyn ContestStore>,
    finder: Arc<dyn SolutionLookup>,
    clock: Arc<dyn Clock>,
    fetch_guard: JobGuard,
    lifecycle_guard: JobGuard,
    backfill_guard: JobGuard,
}

impl SyncPipeline {
    pub fn new(
        http: Arc<HttpFetcher>,
        adapters: Vec<Arc<dyn ContestAdapter>>,
        store: Arc<dyn ContestStore>,
        finder: Arc<dyn SolutionLookup>,
    ) -> Self {
        Self {
            http,
            adapters,
            store,
            finder,
            clock: Arc::new(SystemClock),
            fetch_guard: JobGuard::new("fetch"),
            lifecycle_guard: JobGuard::new("lifecycle"),
            backfill_guard: JobGuard::new("backfill"),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wires adapters from the registry and a YouTube-backed finder.
    pub fn from_config(
        config: &SyncConfig,
        registry: &SourceRegistry,
        store: Arc<dyn ContestStore>,
    ) -> Result<Self> {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?);
        // search.list is quota-billed; pace it separately from the contest feeds.
        let search_http = Arc::new(HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            token_bucket: Some(TokenBucketConfig {
                capacity: 5,
                refill_every: Duration::from_secs(1),
            }),
            ..Default::default()
        })?);
        let search = YouTubeSearch::new(search_http, config.youtube_api_key.clone());
        let finder = SolutionFinder::new(Arc::new(search), registry.trusted_channels());
        Ok(Self::new(http, registry.adapters(), store, Arc::new(finder)))
    }

    pub async fn run_fetch(&self) -> Option<Result<FetchRunSummary, StoreError>> {
        self.fetch_guard
            .run(run_fetch_cycle(
                &self.adapters,
                &self.http,
                self.store.as_ref(),
                self.clock.as_ref(),
            ))
            .await
    }

    pub async fn run_lifecycle(&self) -> Option<Result<LifecycleSummary, StoreError>> {
        self.lifecycle_guard
            .run(run_lifecycle_scan(
                self.store.as_ref(),
                self.finder.as_ref(),
                self.clock.as_ref(),
            ))
            .await
    }

    pub async fn run_backfill(&self) -> Option<Result<BackfillSummary, StoreError>> {
        self.backfill_guard
            .run(run_backfill(self.store.as_ref(), self.finder.as_ref()))
            .await
    }

    /// Startup order: fetch, then lifecycle, then the one-time backfill.
    /// A failing job is logged and does not stop the ones after it.
    pub async fn run_startup(&self) -> StartupSummary {
        StartupSummary {
            fetch: logged("fetch", self.run_fetch().await),
            lifecycle: logged("lifecycle", self.run_lifecycle().await),
            backfill: logged("backfill", self.run_backfill().await),
        }
    }

    pub(crate) async fn scheduled_fetch(&self) {
        logged("fetch", self.run_fetch().await);
    }

    pub(crate) async fn scheduled_lifecycle(&self) {
        logged("lifecycle", self.run_lifecycle().await);
    }
}

fn logged<T>(job: &'static str, outcome: Option<Result<T, StoreError>>) -> Option<T> {
    match outcome? {
        Ok(summary) => Some(summary),
        Err(err) => {
            error!(job, error = %err, "job failed, retrying on the next tick");
            None
        }
    }
}
