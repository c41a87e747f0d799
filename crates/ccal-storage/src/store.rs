use std::collections::HashSet;

use async_trait::async_trait;
use ccal_core::{Contest, ContestDraft, ContestStatus, OAuthTokens, Platform};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid stored row for contest {id}: {reason}")]
    InvalidRow { id: Uuid, reason: String },
    #[error("contest {0} not found")]
    ContestNotFound(Uuid),
    #[error("write rejected for contest {0}")]
    Rejected(Uuid),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

impl UpsertSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Durable contest records.
///
/// Every write touches exactly one record; no operation spans records, so
/// concurrent fetch and lifecycle jobs only ever race on single-row updates.
/// Nothing here deletes a contest.
#[async_trait]
pub trait ContestStore: Send + Sync {
    /// Inserts each draft or refreshes the record sharing its `(name, start_time)`.
    ///
    /// Refreshing rewrites the upstream-owned fields (platform, duration, end
    /// time, url) and leaves `status` and `solution_url` alone. A failing record
    /// is counted in `failed` and does not stop the rest of the batch.
    async fn upsert_batch(&self, drafts: &[ContestDraft]) -> Result<UpsertSummary, StoreError>;

    async fn find_all(&self) -> Result<Vec<Contest>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Contest>, StoreError>;

    async fn find_by_status_not(&self, status: ContestStatus) -> Result<Vec<Contest>, StoreError>;

    /// Contests in `status` on one of `platforms` that have no solution yet.
    async fn find_missing_solutions(
        &self,
        status: ContestStatus,
        platforms: &[Platform],
    ) -> Result<Vec<Contest>, StoreError>;

    async fn update_status(&self, id: Uuid, status: ContestStatus) -> Result<(), StoreError>;

    /// Records a solution only if none is stored yet. Returns whether it was written.
    async fn set_solution_url(&self, id: Uuid, solution_url: &str) -> Result<bool, StoreError>;
}

/// Bookmarks and OAuth tokens kept per user by the identity collaborator.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn saved_contest_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    /// Flips bookmark membership. Returns `true` when the contest is now saved.
    async fn toggle_saved(&self, user_id: Uuid, contest_id: Uuid) -> Result<bool, StoreError>;

    async fn load_tokens(&self, user_id: Uuid) -> Result<Option<OAuthTokens>, StoreError>;

    async fn save_tokens(&self, user_id: Uuid, tokens: &OAuthTokens) -> Result<(), StoreError>;
}
