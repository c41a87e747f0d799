use std::sync::Arc;

use ccal_adapters::{fetch_all, AdapterContext, ContestAdapter};
use ccal_core::{Clock, ContestDraft};
use ccal_storage::{ContestStore, HttpFetcher, StoreError, UpsertSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub contests: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub upsert: UpsertSummary,
}

impl FetchRunSummary {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// One fetch-and-store cycle.
///
/// Every adapter finishes (or times out) before anything is written; the
/// combined batch is then upserted in one call.
pub async fn run_fetch_cycle(
    adapters: &[Arc<dyn ContestAdapter>],
    http: &HttpFetcher,
    store: &dyn ContestStore,
    clock: &dyn Clock,
) -> Result<FetchRunSummary, StoreError> {
    let started_at = clock.now();
    let ctx = AdapterContext::new(started_at);

    let outcomes = fetch_all(adapters, http, &ctx).await;
    let mut sources = Vec::with_capacity(outcomes.len());
    let mut batch: Vec<ContestDraft> = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(drafts) => {
                sources.push(SourceReport {
                    source_id: outcome.source_id,
                    contests: drafts.len(),
                    error: None,
                });
                batch.extend(drafts);
            }
            Err(err) => sources.push(SourceReport {
                source_id: outcome.source_id,
                contests: 0,
                error: Some(err.to_string()),
            }),
        }
    }

    let upsert = store.upsert_batch(&batch).await?;
    let summary = FetchRunSummary {
        run_id: ctx.run_id,
        started_at,
        finished_at: clock.now(),
        sources,
        upsert,
    };
    info!(
        run_id = %summary.run_id,
        sources = summary.sources.len(),
        failed_sources = summary.failed_sources(),
        inserted = upsert.inserted,
        updated = upsert.updated,
        failed = upsert.failed,
        "fetch cycle finished"
    );
    Ok(summary)
}
