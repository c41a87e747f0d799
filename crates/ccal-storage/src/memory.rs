use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use ccal_core::{Contest, ContestDraft, ContestKey, ContestStatus, OAuthTokens, Platform};
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{ContestStore, StoreError, UpsertSummary, UserStore};

#[derive(Debug, Default)]
struct ContestTable {
    rows: HashMap<Uuid, Contest>,
    by_key: HashMap<ContestKey, Uuid>,
    rejected: HashSet<Uuid>,
}

/// Process-local contest store used by tests and database-less dry runs.
#[derive(Debug, Default)]
pub struct MemoryContestStore {
    table: RwLock<ContestTable>,
}

impl MemoryContestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record, replacing any record with the same identity.
    pub async fn seed(&self, contest: Contest) {
        let mut table = self.table.write().await;
        if let Some(old_id) = table.by_key.insert(contest.key(), contest.id) {
            table.rows.remove(&old_id);
        }
        table.rows.insert(contest.id, contest);
    }

    /// Makes every later status or solution write for `id` fail.
    pub async fn reject_writes_for(&self, id: Uuid) {
        self.table.write().await.rejected.insert(id);
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }
}

#[async_trait]
impl ContestStore for MemoryContestStore {
    async fn upsert_batch(&self, drafts: &[ContestDraft]) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary::default();
        let mut guard = self.table.write().await;
        let table = &mut *guard;
        let now = Utc::now();
        for draft in drafts {
            let existing = table.by_key.get(&draft.key()).copied();
            match existing.and_then(|id| table.rows.get_mut(&id)) {
                Some(row) => {
                    row.platform = draft.platform;
                    row.duration = draft.duration.clone();
                    row.end_time = draft.end_time;
                    row.url = draft.url.clone();
                    row.updated_at = now;
                    summary.updated += 1;
                }
                None => {
                    let id = Uuid::new_v4();
                    table.by_key.insert(draft.key(), id);
                    table.rows.insert(id, Contest::from_draft(id, draft.clone(), now));
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn find_all(&self) -> Result<Vec<Contest>, StoreError> {
        let table = self.table.read().await;
        let mut out = table.rows.values().cloned().collect::<Vec<_>>();
        out.sort_by_key(|c| c.start_time);
        Ok(out)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Contest>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_status_not(&self, status: ContestStatus) -> Result<Vec<Contest>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|c| c.status != status)
            .cloned()
            .collect())
    }

    async fn find_missing_solutions(
        &self,
        status: ContestStatus,
        platforms: &[Platform],
    ) -> Result<Vec<Contest>, StoreError> {
        let table = self.table.read().await;
        let mut out = table
            .rows
            .values()
            .filter(|c| {
                c.status == status && c.solution_url.is_none() && platforms.contains(&c.platform)
            })
            .cloned()
            .collect::<Vec<_>>();
        out.sort_by_key(|c| c.end_time);
        Ok(out)
    }

    async fn update_status(&self, id: Uuid, status: ContestStatus) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        if table.rejected.contains(&id) {
            return Err(StoreError::Rejected(id));
        }
        let row = table.rows.get_mut(&id).ok_or(StoreError::ContestNotFound(id))?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_solution_url(&self, id: Uuid, solution_url: &str) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        if table.rejected.contains(&id) {
            return Err(StoreError::Rejected(id));
        }
        let row = table.rows.get_mut(&id).ok_or(StoreError::ContestNotFound(id))?;
        if row.solution_url.is_some() {
            return Ok(false);
        }
        row.solution_url = Some(solution_url.to_string());
        row.updated_at = Utc::now();
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct UserTable {
    saved: HashMap<Uuid, HashSet<Uuid>>,
    tokens: HashMap<Uuid, OAuthTokens>,
}

/// In-memory [`UserStore`]; bookmark toggles check contest existence against `contests`.
#[derive(Debug)]
pub struct MemoryUserStore {
    contests: Arc<MemoryContestStore>,
    table: RwLock<UserTable>,
}

impl MemoryUserStore {
    pub fn new(contests: Arc<MemoryContestStore>) -> Self {
        Self {
            contests,
            table: RwLock::new(UserTable::default()),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn saved_contest_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .saved
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn toggle_saved(&self, user_id: Uuid, contest_id: Uuid) -> Result<bool, StoreError> {
        if self.contests.find_by_id(contest_id).await?.is_none() {
            return Err(StoreError::ContestNotFound(contest_id));
        }
        let mut table = self.table.write().await;
        let saved = table.saved.entry(user_id).or_default();
        if saved.remove(&contest_id) {
            Ok(false)
        } else {
            saved.insert(contest_id);
            Ok(true)
        }
    }

    async fn load_tokens(&self, user_id: Uuid) -> Result<Option<OAuthTokens>, StoreError> {
        Ok(self.table.read().await.tokens.get(&user_id).cloned())
    }

    async fn save_tokens(&self, user_id: Uuid, tokens: &OAuthTokens) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let refresh_token = tokens
            .refresh_token
            .clone()
            .or_else(|| table.tokens.get(&user_id).and_then(|t| t.refresh_token.clone()));
        table.tokens.insert(
            user_id,
            OAuthTokens {
                refresh_token,
                ..tokens.clone()
            },
        );
        Ok(())
    }
}
