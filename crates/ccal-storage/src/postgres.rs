use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ccal_core::{Contest, ContestDraft, ContestStatus, OAuthTokens, Platform};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{error, info};
use uuid::Uuid;

use crate::store::{ContestStore, StoreError, UpsertSummary, UserStore};

const CONTEST_COLUMNS: &str = "id, name, platform, duration, start_time, end_time, status, url, \
                               solution_url, created_at, updated_at";

/// Opens the pool and checks the connection. Callers treat an error as fatal.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgContestStore {
    pool: PgPool,
}

impl PgContestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_one(&self, draft: &ContestDraft) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO contests (id, name, platform, duration, start_time, end_time, status, url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (name, start_time) DO UPDATE
               SET platform = EXCLUDED.platform,
                   duration = EXCLUDED.duration,
                   end_time = EXCLUDED.end_time,
                   url = EXCLUDED.url,
                   updated_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&draft.name)
        .bind(draft.platform.as_str())
        .bind(&draft.duration)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.status.as_str())
        .bind(&draft.url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("inserted")?)
    }
}

fn contest_from_row(row: &PgRow) -> Result<Contest, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let platform: String = row.try_get("platform")?;
    let status: String = row.try_get("status")?;
    let invalid = |reason: String| StoreError::InvalidRow { id, reason };
    Ok(Contest {
        id,
        name: row.try_get("name")?,
        platform: platform.parse().map_err(|e: ccal_core::ContestError| invalid(e.to_string()))?,
        duration: row.try_get("duration")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        status: status.parse().map_err(|e: ccal_core::ContestError| invalid(e.to_string()))?,
        url: row.try_get("url")?,
        solution_url: row.try_get("solution_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn contests_from_rows(rows: &[PgRow]) -> Result<Vec<Contest>, StoreError> {
    rows.iter().map(contest_from_row).collect()
}

#[async_trait]
impl ContestStore for PgContestStore {
    async fn upsert_batch(&self, drafts: &[ContestDraft]) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary::default();
        for draft in drafts {
            match self.upsert_one(draft).await {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.updated += 1,
                Err(err) => {
                    error!(name = %draft.name, start_time = %draft.start_time, error = %err, "contest upsert failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn find_all(&self) -> Result<Vec<Contest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTEST_COLUMNS} FROM contests ORDER BY start_time ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        contests_from_rows(&rows)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Contest>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CONTEST_COLUMNS} FROM contests WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(contest_from_row).transpose()
    }

    async fn find_by_status_not(&self, status: ContestStatus) -> Result<Vec<Contest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTEST_COLUMNS} FROM contests WHERE status <> $1"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        contests_from_rows(&rows)
    }

    async fn find_missing_solutions(
        &self,
        status: ContestStatus,
        platforms: &[Platform],
    ) -> Result<Vec<Contest>, StoreError> {
        let platforms = platforms
            .iter()
            .map(|p| p.as_str().to_string())
            .collect::<Vec<_>>();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONTEST_COLUMNS}
              FROM contests
             WHERE status = $1
               AND solution_url IS NULL
               AND platform = ANY($2)
             ORDER BY end_time ASC
            "#
        ))
        .bind(status.as_str())
        .bind(&platforms)
        .fetch_all(&self.pool)
        .await?;
        contests_from_rows(&rows)
    }

    async fn update_status(&self, id: Uuid, status: ContestStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE contests SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ContestNotFound(id));
        }
        Ok(())
    }

    async fn set_solution_url(&self, id: Uuid, solution_url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE contests
               SET solution_url = $2,
                   updated_at = NOW()
             WHERE id = $1
               AND solution_url IS NULL
            "#,
        )
        .bind(id)
        .bind(solution_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn saved_contest_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT contest_id FROM saved_contests WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashSet::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("contest_id")?);
        }
        Ok(out)
    }

    async fn toggle_saved(&self, user_id: Uuid, contest_id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query("SELECT 1 FROM contests WHERE id = $1")
            .bind(contest_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::ContestNotFound(contest_id));
        }

        let removed = sqlx::query(
            "DELETE FROM saved_contests WHERE user_id = $1 AND contest_id = $2",
        )
        .bind(user_id)
        .bind(contest_id)
        .execute(&self.pool)
        .await?;
        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO saved_contests (user_id, contest_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, contest_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(contest_id)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn load_tokens(&self, user_id: Uuid) -> Result<Option<OAuthTokens>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, token_expires_at
              FROM users
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let access_token: Option<String> = row.try_get("access_token")?;
        let refresh_token: Option<String> = row.try_get("refresh_token")?;
        let expires_at: Option<DateTime<Utc>> = row.try_get("token_expires_at")?;
        Ok(access_token.map(|access_token| OAuthTokens {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    async fn save_tokens(&self, user_id: Uuid, tokens: &OAuthTokens) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, access_token, refresh_token, token_expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET access_token = EXCLUDED.access_token,
                   refresh_token = COALESCE(EXCLUDED.refresh_token, users.refresh_token),
                   token_expires_at = EXCLUDED.token_expires_at
            "#,
        )
        .bind(user_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
