use ccal_core::{Clock, Contest, ContestStatus};
use ccal_storage::{ContestStore, StoreError};
use serde::Serialize;
use tracing::{error, info};

use crate::solution::SolutionLookup;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleSummary {
    pub scanned: usize,
    pub transitioned: usize,
    pub lookups: usize,
    pub solutions_found: usize,
    pub failed: usize,
}

/// Advances every non-terminal contest to the status its window implies at `clock.now()`.
///
/// Records are written one at a time and only when their status changes. A
/// contest that moves into `Past` without a solution gets exactly one lookup;
/// contests that were already `Past` are left to the backfill pass.
pub async fn run_lifecycle_scan(
    store: &dyn ContestStore,
    finder: &dyn SolutionLookup,
    clock: &dyn Clock,
) -> Result<LifecycleSummary, StoreError> {
    let candidates = store.find_by_status_not(ContestStatus::Past).await?;
    let mut summary = LifecycleSummary {
        scanned: candidates.len(),
        ..Default::default()
    };

    for contest in candidates {
        let target = contest.target_status(clock.now());
        if target == contest.status {
            continue;
        }
        if let Err(err) = store.update_status(contest.id, target).await {
            error!(contest_id = %contest.id, name = %contest.name, error = %err, "status update failed");
            summary.failed += 1;
            continue;
        }
        info!(
            contest_id = %contest.id,
            name = %contest.name,
            from = %contest.status,
            to = %target,
            "contest status changed"
        );
        summary.transitioned += 1;

        if target.is_terminal() && contest.solution_url.is_none() {
            summary.lookups += 1;
            if attach_solution(store, finder, &contest).await {
                summary.solutions_found += 1;
            }
        }
    }

    info!(
        scanned = summary.scanned,
        transitioned = summary.transitioned,
        lookups = summary.lookups,
        solutions_found = summary.solutions_found,
        failed = summary.failed,
        "lifecycle scan finished"
    );
    Ok(summary)
}

/// Looks up and stores a solution for `contest`. Returns whether one was written.
pub(crate) async fn attach_solution(
    store: &dyn ContestStore,
    finder: &dyn SolutionLookup,
    contest: &Contest,
) -> bool {
    let Some(video_id) = finder
        .find(&contest.name, contest.end_time, contest.platform)
        .await
    else {
        return false;
    };
    match store.set_solution_url(contest.id, &video_id).await {
        Ok(written) => written,
        Err(err) => {
            error!(contest_id = %contest.id, error = %err, "storing solution failed");
            false
        }
    }
}
