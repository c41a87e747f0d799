//! Calendar export collaborators.
//!
//! [`CredentialProvider`] hands out a currently valid Google access token for
//! a user, refreshing and persisting it when the stored one has expired.
//! [`CalendarClient`] turns one contest into one calendar event.

use std::sync::Arc;

use async_trait::async_trait;
use ccal_core::{Clock, Contest, OAuthTokens};
use ccal_storage::{FetchError, HttpFetcher, StoreError, UserStore};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_EVENTS_ENDPOINT: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";

const OAUTH_SOURCE_ID: &str = "google-oauth";
const CALENDAR_SOURCE_ID: &str = "google-calendar";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("user {0} has not connected a calendar")]
    NotConnected(Uuid),
    #[error("calendar authorization expired; the user must sign in again")]
    ReauthenticationRequired,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("calendar request failed: {0}")]
    Upstream(#[from] FetchError),
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens, FetchError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct GoogleTokenRefresher {
    http: Arc<HttpFetcher>,
    client_id: String,
    client_secret: String,
    clock: Arc<dyn Clock>,
}

impl GoogleTokenRefresher {
    pub fn new(
        http: Arc<HttpFetcher>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            clock,
        }
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens, FetchError> {
        let form = [
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
            ("refresh_token", refresh_token.to_string()),
            ("grant_type", "refresh_token".to_string()),
        ];
        let issued_at = self.clock.now();
        let response: TokenResponse = self
            .http
            .post_form(OAUTH_SOURCE_ID, GOOGLE_TOKEN_ENDPOINT, &form)
            .await?;
        Ok(OAuthTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: expiry_after(issued_at, response.expires_in),
        })
    }
}

/// Absolute expiry for an `expires_in` lifetime; a lifetime chrono cannot represent counts as unknown.
fn expiry_after(issued_at: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    let lifetime = TimeDelta::try_seconds(expires_in?)?;
    issued_at.checked_add_signed(lifetime)
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid access token for `user_id`.
    async fn access_token(&self, user_id: Uuid) -> Result<String, CalendarError>;
}

/// Tokens read from the [`UserStore`], renewed through a [`TokenRefresher`] when expired.
pub struct StoredCredentials {
    users: Arc<dyn UserStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
}

impl StoredCredentials {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            refresher,
            clock,
        }
    }
}

#[async_trait]
impl CredentialProvider for StoredCredentials {
    async fn access_token(&self, user_id: Uuid) -> Result<String, CalendarError> {
        let tokens = self
            .users
            .load_tokens(user_id)
            .await?
            .ok_or(CalendarError::NotConnected(user_id))?;
        if !tokens.is_expired(self.clock.now()) {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(CalendarError::ReauthenticationRequired);
        };
        let renewed = match self.refresher.refresh(refresh_token).await {
            Ok(renewed) => renewed,
            Err(err) => {
                warn!(%user_id, error = %err, "access token refresh failed");
                return Err(CalendarError::ReauthenticationRequired);
            }
        };
        self.users.save_tokens(user_id, &renewed).await?;
        info!(%user_id, "access token refreshed");
        Ok(renewed.access_token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default, rename = "htmlLink")]
    pub html_link: Option<String>,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn create_event(
        &self,
        access_token: &str,
        contest: &Contest,
    ) -> Result<CalendarEvent, CalendarError>;
}

pub fn event_body(contest: &Contest) -> serde_json::Value {
    let at = |t: DateTime<Utc>| json!({ "dateTime": t.to_rfc3339_opts(SecondsFormat::Secs, true), "timeZone": "UTC" });
    json!({
        "summary": contest.name,
        "description": contest.url,
        "start": at(contest.start_time),
        "end": at(contest.end_time),
    })
}

/// Google Calendar v3 client writing to the user's primary calendar.
pub struct GoogleCalendarClient {
    http: Arc<HttpFetcher>,
    endpoint: String,
}

impl GoogleCalendarClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self {
            http,
            endpoint: GOOGLE_EVENTS_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn create_event(
        &self,
        access_token: &str,
        contest: &Contest,
    ) -> Result<CalendarEvent, CalendarError> {
        let body = event_body(contest);
        let response = self
            .http
            .send_with_retry(CALENDAR_SOURCE_ID, &self.endpoint, |client| {
                client.post(&self.endpoint).bearer_auth(access_token).json(&body)
            })
            .await
            .map_err(|err| match err {
                FetchError::HttpStatus { status: 401, .. } => CalendarError::ReauthenticationRequired,
                other => CalendarError::Upstream(other),
            })?;
        Ok(response.json()?)
    }
}
