use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, info_span, Instrument};

use crate::pipeline::SyncPipeline;

/// Serializes runs of one named job: a tick that arrives while the previous
/// run is still going is skipped, not queued.
#[derive(Debug)]
pub struct JobGuard {
    name: &'static str,
    running: Mutex<()>,
}

impl JobGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(()),
        }
    }

    /// Runs `job` unless a previous run holds the guard. `None` means skipped.
    pub async fn run<F, T>(&self, job: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let Ok(_running) = self.running.try_lock() else {
            info!(job = self.name, "previous run still in progress, skipping tick");
            return None;
        };
        Some(job.instrument(info_span!("scheduled_job", job = self.name)).await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub fetch: Duration,
    pub lifecycle: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(60 * 60),
            lifecycle: Duration::from_secs(5 * 60),
        }
    }
}

/// Registers the recurring fetch and lifecycle jobs. The backfill pass is a
/// startup-only job and is not scheduled here.
pub async fn build_scheduler(pipeline: Arc<SyncPipeline>, cadence: Cadence) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let fetch_pipeline = Arc::clone(&pipeline);
    let fetch_job = Job::new_repeated_async(cadence.fetch, move |_uuid, _l| {
        let pipeline = Arc::clone(&fetch_pipeline);
        Box::pin(async move {
            pipeline.scheduled_fetch().await;
        })
    })
    .context("creating fetch job")?;
    sched.add(fetch_job).await.context("adding fetch job")?;

    let lifecycle_pipeline = Arc::clone(&pipeline);
    let lifecycle_job = Job::new_repeated_async(cadence.lifecycle, move |_uuid, _l| {
        let pipeline = Arc::clone(&lifecycle_pipeline);
        Box::pin(async move {
            pipeline.scheduled_lifecycle().await;
        })
    })
    .context("creating lifecycle job")?;
    sched.add(lifecycle_job).await.context("adding lifecycle job")?;

    info!(
        fetch_every_secs = cadence.fetch.as_secs(),
        lifecycle_every_secs = cadence.lifecycle.as_secs(),
        "scheduler jobs registered"
    );
    Ok(sched)
}
