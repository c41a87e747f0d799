//! Contest pipeline orchestration: fetch-and-store, status lifecycle,
//! solution lookup, backfill and the scheduler that drives them.

mod backfill;
mod config;
mod fetch;
mod lifecycle;
mod pipeline;
mod scheduler;
mod solution;

pub use backfill::{run_backfill, BackfillSummary};
pub use config::{load_source_registry, SourceRegistry, SyncConfig, TrustedChannels, REGISTRY_FILE};
pub use fetch::{run_fetch_cycle, FetchRunSummary, SourceReport};
pub use lifecycle::{run_lifecycle_scan, LifecycleSummary};
pub use pipeline::{StartupSummary, SyncPipeline};
pub use scheduler::{build_scheduler, Cadence, JobGuard};
pub use solution::{
    youtube_query, SearchError, SearchRequest, SolutionFinder, SolutionLookup, VideoSearch,
    YouTubeSearch, YOUTUBE_SEARCH_ENDPOINT,
};

pub const CRATE_NAME: &str = "ccal-sync";

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use async_trait::async_trait;
    use ccal_adapters::{AdapterContext, AdapterError, ContestAdapter};
    use ccal_core::{Contest, ContestDraft, ContestStatus, FixedClock, Platform};
    use ccal_storage::{ContestStore, FetchError, HttpClientConfig, HttpFetcher, MemoryContestStore};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().expect("valid timestamp")
    }

    struct StaticAdapter {
        platform: Platform,
        names: Vec<&'static str>,
    }

    #[async_trait]
    impl ContestAdapter for StaticAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(
            &self,
            _http: &HttpFetcher,
            ctx: &AdapterContext,
        ) -> Result<Vec<ContestDraft>, AdapterError> {
            let start = ctx.now + Duration::days(1);
            Ok(self
                .names
                .iter()
                .map(|name| {
                    ContestDraft::new(
                        *name,
                        self.platform,
                        start,
                        start + Duration::hours(2),
                        format!("https://example.test/{name}"),
                        ctx.now,
                    )
                    .expect("valid draft")
                })
                .collect())
        }
    }

    struct UnreachableAdapter;

    #[async_trait]
    impl ContestAdapter for UnreachableAdapter {
        fn platform(&self) -> Platform {
            Platform::HackerEarth
        }

        async fn fetch(
            &self,
            _http: &HttpFetcher,
            _ctx: &AdapterContext,
        ) -> Result<Vec<ContestDraft>, AdapterError> {
            Err(AdapterError::Fetch(FetchError::Closed))
        }
    }

    /// Records every lookup and answers with a fixed video id.
    struct RecordingFinder {
        calls: Mutex<Vec<(String, DateTime<Utc>, Platform)>>,
        answer: Option<&'static str>,
        trusted: Vec<Platform>,
    }

    impl RecordingFinder {
        fn answering(answer: Option<&'static str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer,
                trusted: vec![Platform::Codeforces],
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl SolutionLookup for RecordingFinder {
        async fn find(
            &self,
            contest_name: &str,
            end_time: DateTime<Utc>,
            platform: Platform,
        ) -> Option<String> {
            self.calls
                .lock()
                .expect("lock")
                .push((contest_name.to_string(), end_time, platform));
            self.answer.map(str::to_string)
        }

        fn trusted_platforms(&self) -> Vec<Platform> {
            self.trusted.clone()
        }
    }

    fn stored(
        name: &str,
        platform: Platform,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: ContestStatus,
        solution: Option<&str>,
    ) -> Contest {
        let draft = ContestDraft::new(name, platform, start, end, "https://example.test", start - Duration::days(3))
            .expect("valid draft");
        let mut contest = Contest::from_draft(Uuid::new_v4(), draft, start - Duration::days(3));
        contest.status = status;
        contest.solution_url = solution.map(str::to_string);
        contest
    }

    fn http() -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig::default()).expect("http client")
    }

    #[tokio::test]
    async fn failing_source_is_skipped_and_the_rest_are_stored() {
        let store = MemoryContestStore::new();
        let clock = FixedClock::new(now());
        let adapters: Vec<Arc<dyn ContestAdapter>> = vec![
            Arc::new(StaticAdapter {
                platform: Platform::Codeforces,
                names: vec!["Codeforces Round 1061 (Div. 2)"],
            }),
            Arc::new(UnreachableAdapter),
            Arc::new(StaticAdapter {
                platform: Platform::LeetCode,
                names: vec!["Weekly Contest 472"],
            }),
        ];

        let summary = run_fetch_cycle(&adapters, &http(), &store, &clock).await.expect("run fetch cycle");

        assert_eq!(store.len().await, 2);
        assert_eq!(summary.upsert.inserted, 2);
        assert_eq!(summary.failed_sources(), 1);
        assert_eq!(summary.sources[1].source_id, "hackerearth");
        assert!(summary.sources[1].error.is_some());
    }

    #[tokio::test]
    async fn repeating_a_fetch_with_identical_input_adds_nothing() {
        let store = MemoryContestStore::new();
        let clock = FixedClock::new(now());
        let adapters: Vec<Arc<dyn ContestAdapter>> = vec![Arc::new(StaticAdapter {
            platform: Platform::Codeforces,
            names: vec!["Round A", "Round B"],
        })];
        let http = http();

        run_fetch_cycle(&adapters, &http, &store, &clock).await.expect("run fetch cycle");
        let second = run_fetch_cycle(&adapters, &http, &store, &clock).await.expect("run fetch cycle");

        assert_eq!(store.len().await, 2);
        assert_eq!(second.upsert.inserted, 0);
        assert_eq!(second.upsert.updated, 2);
    }

    #[tokio::test]
    async fn contest_that_ended_ten_minutes_ago_becomes_past_with_one_lookup() {
        let store = MemoryContestStore::new();
        let end = now() - Duration::minutes(10);
        let contest = stored(
            "Codeforces Round 1060 (Div. 1)",
            Platform::Codeforces,
            end - Duration::hours(2),
            end,
            ContestStatus::Upcoming,
            None,
        );
        let id = contest.id;
        store.seed(contest).await;
        let finder = RecordingFinder::answering(Some("vid-1060"));
        let clock = FixedClock::new(now());

        let summary = run_lifecycle_scan(&store, &finder, &clock).await.expect("run lifecycle scan");

        let after = store.find_by_id(id).await.expect("find by id").expect("contest exists");
        assert_eq!(after.status, ContestStatus::Past);
        assert_eq!(after.solution_url.as_deref(), Some("vid-1060"));
        assert_eq!(finder.calls(), 1);
        assert_eq!(finder.calls.lock().expect("lock")[0].1, end);
        assert_eq!(summary.transitioned, 1);
        assert_eq!(summary.solutions_found, 1);
    }

    #[tokio::test]
    async fn statuses_follow_the_clock_across_scans() {
        let store = MemoryContestStore::new();
        let start = now() + Duration::minutes(3);
        let contest = stored(
            "Weekly Contest 472",
            Platform::LeetCode,
            start,
            start + Duration::minutes(90),
            ContestStatus::Upcoming,
            None,
        );
        let id = contest.id;
        store.seed(contest).await;
        let finder = RecordingFinder::answering(None);
        let clock = FixedClock::new(now());

        run_lifecycle_scan(&store, &finder, &clock).await.expect("run lifecycle scan");
        assert_eq!(store.find_by_id(id).await.expect("find by id").expect("contest exists").status, ContestStatus::Upcoming);

        clock.advance(Duration::minutes(5));
        run_lifecycle_scan(&store, &finder, &clock).await.expect("run lifecycle scan");
        assert_eq!(store.find_by_id(id).await.expect("find by id").expect("contest exists").status, ContestStatus::OnGoing);
        assert_eq!(finder.calls(), 0);

        clock.advance(Duration::minutes(90));
        run_lifecycle_scan(&store, &finder, &clock).await.expect("run lifecycle scan");
        assert_eq!(store.find_by_id(id).await.expect("find by id").expect("contest exists").status, ContestStatus::Past);
        assert_eq!(finder.calls(), 1);

        // already Past without a solution: left for the backfill pass
        clock.advance(Duration::minutes(5));
        let summary = run_lifecycle_scan(&store, &finder, &clock).await.expect("run lifecycle scan");
        assert_eq!(summary.scanned, 0);
        assert_eq!(finder.calls(), 1);
    }

    #[tokio::test]
    async fn found_solution_survives_later_runs() {
        let store = MemoryContestStore::new();
        let end = now() - Duration::minutes(1);
        let contest = stored("Round 5", Platform::Codeforces, end - Duration::hours(2), end, ContestStatus::OnGoing, None);
        let id = contest.id;
        store.seed(contest).await;
        let clock = FixedClock::new(now());

        let first = RecordingFinder::answering(Some("first-video"));
        run_lifecycle_scan(&store, &first, &clock).await.expect("run lifecycle scan");

        let second = RecordingFinder::answering(Some("second-video"));
        run_lifecycle_scan(&store, &second, &clock).await.expect("run lifecycle scan");
        run_lifecycle_scan(&store, &second, &clock).await.expect("run lifecycle scan");
        run_backfill(&store, &second).await.expect("run backfill");

        let after = store.find_by_id(id).await.expect("find by id").expect("contest exists");
        assert_eq!(after.solution_url.as_deref(), Some("first-video"));
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn transition_with_existing_solution_skips_lookup() {
        let store = MemoryContestStore::new();
        let end = now() - Duration::minutes(1);
        store
            .seed(stored("Round 6", Platform::Codeforces, end - Duration::hours(1), end, ContestStatus::OnGoing, Some("kept")))
            .await;
        let finder = RecordingFinder::answering(Some("other"));
        let summary = run_lifecycle_scan(&store, &finder, &FixedClock::new(now())).await.expect("run lifecycle scan");
        assert_eq!(summary.transitioned, 1);
        assert_eq!(summary.lookups, 0);
        assert_eq!(finder.calls(), 0);
    }

    #[tokio::test]
    async fn failed_status_write_does_not_stop_the_scan() {
        let store = MemoryContestStore::new();
        let end = now() - Duration::minutes(30);
        let broken = stored("Round 7", Platform::Codeforces, end - Duration::hours(2), end, ContestStatus::Upcoming, None);
        let healthy = stored("Round 8", Platform::Codeforces, end - Duration::hours(1), end, ContestStatus::OnGoing, None);
        let (broken_id, healthy_id) = (broken.id, healthy.id);
        store.seed(broken).await;
        store.seed(healthy).await;
        store.reject_writes_for(broken_id).await;
        let finder = RecordingFinder::answering(None);

        let summary = run_lifecycle_scan(&store, &finder, &FixedClock::new(now())).await.expect("run lifecycle scan");

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.transitioned, 1);
        assert_eq!(store.find_by_id(healthy_id).await.expect("find by id").expect("contest exists").status, ContestStatus::Past);
        assert_eq!(store.find_by_id(broken_id).await.expect("find by id").expect("contest exists").status, ContestStatus::Upcoming);
    }

    #[tokio::test]
    async fn backfill_looks_up_only_past_trusted_contests_without_solutions() {
        let store = MemoryContestStore::new();
        for i in 0..5 {
            let end = now() - Duration::days(i + 1);
            let solution = if i < 2 { Some("have-it") } else { None };
            store
                .seed(stored(
                    &format!("Codeforces Round {}", 1000 + i),
                    Platform::Codeforces,
                    end - Duration::hours(2),
                    end,
                    ContestStatus::Past,
                    solution,
                ))
                .await;
        }
        let end = now() - Duration::days(2);
        store
            .seed(stored("Weekly Contest 470", Platform::LeetCode, end - Duration::hours(1), end, ContestStatus::Past, None))
            .await;
        let finder = RecordingFinder::answering(None);

        let summary = run_backfill(&store, &finder).await.expect("run backfill");

        assert_eq!(finder.calls(), 3);
        assert_eq!(summary.candidates, 3);
        assert_eq!(summary.solutions_found, 0);
        assert!(finder
            .calls
            .lock()
            .expect("lock")
            .iter()
            .all(|(_, _, platform)| *platform == Platform::Codeforces));
    }

    #[tokio::test]
    async fn startup_runs_fetch_then_lifecycle_then_backfill() {
        let store = Arc::new(MemoryContestStore::new());
        let end = now() - Duration::days(1);
        store
            .seed(stored("Codeforces Round 999", Platform::Codeforces, end - Duration::hours(2), end, ContestStatus::Past, None))
            .await;
        let finder = Arc::new(RecordingFinder::answering(Some("vid")));
        let adapters: Vec<Arc<dyn ContestAdapter>> = vec![Arc::new(StaticAdapter {
            platform: Platform::TopCoder,
            names: vec!["Single Round Match 870"],
        })];
        let pipeline = SyncPipeline::new(Arc::new(http()), adapters, store.clone(), finder.clone())
            .with_clock(Arc::new(FixedClock::new(now())));

        let summary = pipeline.run_startup().await;

        assert_eq!(summary.fetch.expect("fetch ran").upsert.inserted, 1);
        assert_eq!(summary.lifecycle.expect("lifecycle ran").transitioned, 0);
        assert_eq!(summary.backfill.expect("backfill ran").solutions_found, 1);
        assert_eq!(store.len().await, 2);
        assert_eq!(finder.calls(), 1);
    }
}
