use ccal_core::ContestStatus;
use ccal_storage::{ContestStore, StoreError};
use serde::Serialize;
use tracing::info;

use crate::lifecycle::attach_solution;
use crate::solution::SolutionLookup;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub candidates: usize,
    pub lookups: usize,
    pub solutions_found: usize,
}

/// Retries the solution lookup for past contests on trusted-channel platforms that still lack one.
pub async fn run_backfill(
    store: &dyn ContestStore,
    finder: &dyn SolutionLookup,
) -> Result<BackfillSummary, StoreError> {
    let platforms = finder.trusted_platforms();
    if platforms.is_empty() {
        info!("backfill skipped: no platform has a trusted channel");
        return Ok(BackfillSummary::default());
    }

    let candidates = store
        .find_missing_solutions(ContestStatus::Past, &platforms)
        .await?;
    let mut summary = BackfillSummary {
        candidates: candidates.len(),
        ..Default::default()
    };
    for contest in &candidates {
        summary.lookups += 1;
        if attach_solution(store, finder, contest).await {
            summary.solutions_found += 1;
        }
    }

    info!(
        candidates = summary.candidates,
        solutions_found = summary.solutions_found,
        "backfill finished"
    );
    Ok(summary)
}
