//! JSON read API over the contest store, plus bookmarks and calendar export.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ccal_core::{Contest, SystemClock};
use ccal_storage::{ContestStore, HttpClientConfig, HttpFetcher, UserStore};
use chrono::{FixedOffset, Offset, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

mod calendar;
mod error;

pub use calendar::{
    event_body, CalendarClient, CalendarError, CalendarEvent, CredentialProvider,
    GoogleCalendarClient, GoogleTokenRefresher, StoredCredentials, TokenRefresher,
    GOOGLE_EVENTS_ENDPOINT, GOOGLE_TOKEN_ENDPOINT,
};
pub use error::ApiError;

pub const CRATE_NAME: &str = "ccal-web";

/// Header carrying the signed-in user's id, set by the session layer in front of this API.
pub const VIEWER_HEADER: &str = "x-user-id";

const LOCAL_START_FORMAT: &str = "%a, %d %b %Y %H:%M";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub display_offset: FixedOffset,
    pub google_client_id: String,
    pub google_client_secret: String,
}

impl WebConfig {
    pub fn from_env() -> Self {
        let offset_minutes: i32 = std::env::var("CCAL_DISPLAY_UTC_OFFSET_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Self {
            port: std::env::var("CCAL_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            display_offset: display_offset(offset_minutes),
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
        }
    }
}

/// Offset east of UTC; anything `FixedOffset` cannot hold falls back to UTC.
fn display_offset(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

#[derive(Clone)]
pub struct AppState {
    pub contests: Arc<dyn ContestStore>,
    pub users: Arc<dyn UserStore>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub calendar: Arc<dyn CalendarClient>,
    pub display_offset: FixedOffset,
}

impl AppState {
    /// Production wiring: Google token refresh and Google Calendar over a shared fetcher.
    pub fn new(
        contests: Arc<dyn ContestStore>,
        users: Arc<dyn UserStore>,
        config: &WebConfig,
    ) -> anyhow::Result<Self> {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default())?);
        let refresher = GoogleTokenRefresher::new(
            http.clone(),
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
            Arc::new(SystemClock),
        );
        let credentials =
            StoredCredentials::new(users.clone(), Arc::new(refresher), Arc::new(SystemClock));
        Ok(Self {
            contests,
            users,
            credentials: Arc::new(credentials),
            calendar: Arc::new(GoogleCalendarClient::new(http)),
            display_offset: config.display_offset,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContestView {
    #[serde(flatten)]
    pub contest: Contest,
    pub saved: bool,
    pub local_start: String,
}

#[derive(Debug, Serialize)]
struct BookmarkToggled {
    contest_id: Uuid,
    saved: bool,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/contests", get(contests_handler))
        .route("/api/bookmarks", get(bookmarks_handler))
        .route("/api/contests/{id}/bookmark", post(toggle_bookmark_handler))
        .route("/api/contests/{id}/calendar", post(calendar_export_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "web server listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn contests_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ContestView>>, ApiError> {
    let saved = match viewer(&headers) {
        Some(user_id) => state.users.saved_contest_ids(user_id).await?,
        None => HashSet::new(),
    };
    let contests = state.contests.find_all().await?;
    Ok(Json(contest_views(contests, &saved, state.display_offset)))
}

async fn bookmarks_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ContestView>>, ApiError> {
    let user_id = viewer(&headers).ok_or(ApiError::MissingViewer)?;
    let saved = state.users.saved_contest_ids(user_id).await?;
    let contests = state
        .contests
        .find_all()
        .await?
        .into_iter()
        .filter(|c| saved.contains(&c.id))
        .collect();
    Ok(Json(contest_views(contests, &saved, state.display_offset)))
}

async fn toggle_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<BookmarkToggled>, ApiError> {
    let user_id = viewer(&headers).ok_or(ApiError::MissingViewer)?;
    let saved = state.users.toggle_saved(user_id, contest_id).await?;
    Ok(Json(BookmarkToggled { contest_id, saved }))
}

async fn calendar_export_handler(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = viewer(&headers).ok_or(ApiError::MissingViewer)?;
    let contest = state
        .contests
        .find_by_id(contest_id)
        .await?
        .ok_or(ApiError::NotFound(contest_id))?;
    let token = state.credentials.access_token(user_id).await?;
    let event = state.calendar.create_event(&token, &contest).await?;
    info!(%user_id, %contest_id, event_id = %event.id, "calendar event created");
    Ok((StatusCode::CREATED, Json(event)))
}

fn viewer(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(VIEWER_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Sorted ascending by start, each tagged with the viewer's bookmark flag.
pub fn contest_views(
    mut contests: Vec<Contest>,
    saved: &HashSet<Uuid>,
    offset: FixedOffset,
) -> Vec<ContestView> {
    contests.sort_by_key(|c| c.start_time);
    contests
        .into_iter()
        .map(|contest| ContestView {
            saved: saved.contains(&contest.id),
            local_start: contest
                .start_time
                .with_timezone(&offset)
                .format(LOCAL_START_FORMAT)
                .to_string(),
            contest,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use ccal_core::{ContestDraft, ContestStatus, Platform};
    use ccal_storage::{MemoryContestStore, MemoryUserStore};
    use chrono::{DateTime, Duration, TimeZone};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    struct StaticCredentials(Result<&'static str, ()>);

    #[async_trait]
    impl CredentialProvider for StaticCredentials {
        async fn access_token(&self, _user_id: Uuid) -> Result<String, CalendarError> {
            self.0
                .map(str::to_string)
                .map_err(|_| CalendarError::ReauthenticationRequired)
        }
    }

    struct EchoCalendar;

    #[async_trait]
    impl CalendarClient for EchoCalendar {
        async fn create_event(
            &self,
            access_token: &str,
            contest: &Contest,
        ) -> Result<CalendarEvent, CalendarError> {
            Ok(CalendarEvent {
                id: format!("{access_token}:{}", contest.name),
                html_link: None,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().expect("valid timestamp")
    }

    async fn state_with(
        credentials: StaticCredentials,
    ) -> (AppState, Arc<MemoryContestStore>, Vec<Uuid>) {
        let contests = Arc::new(MemoryContestStore::new());
        let drafts = [("Weekly Contest 472", 3), ("Codeforces Round 1061 (Div. 2)", 1)]
            .into_iter()
            .map(|(name, days)| {
                let start = now() + Duration::days(days);
                ContestDraft::new(name, Platform::Codeforces, start, start + Duration::hours(2), "https://example.test", now())
                    .expect("valid draft")
            })
            .collect::<Vec<_>>();
        contests.upsert_batch(&drafts).await.expect("seed contests");
        let ids = contests.find_all().await.expect("find all").iter().map(|c| c.id).collect();
        let state = AppState {
            contests: contests.clone(),
            users: Arc::new(MemoryUserStore::new(contests.clone())),
            credentials: Arc::new(credentials),
            calendar: Arc::new(EchoCalendar),
            display_offset: FixedOffset::east_opt(330 * 60).expect("IST offset"),
        };
        (state, contests, ids)
    }

    fn request(method: &str, uri: &str, user: Option<Uuid>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(VIEWER_HEADER, user.to_string());
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn handler_smoke_healthz() {
        let (state, _, _) = state_with(StaticCredentials(Ok("t"))).await;
        let resp = app(state).oneshot(request("GET", "/healthz", None)).await.expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn contests_are_sorted_and_flagged_per_viewer() {
        let (state, _, ids) = state_with(StaticCredentials(Ok("t"))).await;
        let user = Uuid::new_v4();
        let app = app(state);

        let toggled = app
            .clone()
            .oneshot(request("POST", &format!("/api/contests/{}/bookmark", ids[1]), Some(user)))
            .await
            .expect("response");
        assert_eq!(toggled.status(), StatusCode::OK);
        assert_eq!(json_body(toggled).await["saved"], true);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/contests", Some(user)))
            .await
            .expect("response");
        let list = json_body(resp).await;
        let list = list.as_array().expect("contest list");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["name"], "Codeforces Round 1061 (Div. 2)");
        assert_eq!(list[0]["saved"], false);
        assert_eq!(list[0]["status"], "Upcoming");
        assert_eq!(list[0]["local_start"], "Sat, 17 Oct 2026 17:30");
        assert_eq!(list[1]["saved"], true);

        let anonymous = app
            .oneshot(request("GET", "/api/contests", None))
            .await
            .expect("response");
        let anonymous = json_body(anonymous).await;
        assert!(anonymous
            .as_array()
            .expect("contest list")
            .iter()
            .all(|c| c["saved"] == false));
    }

    #[tokio::test]
    async fn bookmarks_require_a_viewer_and_list_saved_contests() {
        let (state, _, ids) = state_with(StaticCredentials(Ok("t"))).await;
        let user = Uuid::new_v4();
        let app = app(state);

        let resp = app.clone().oneshot(request("GET", "/api/bookmarks", None)).await.expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        app.clone()
            .oneshot(request("POST", &format!("/api/contests/{}/bookmark", ids[0]), Some(user)))
            .await
            .expect("response");
        let saved = json_body(app.oneshot(request("GET", "/api/bookmarks", Some(user))).await.expect("response")).await;
        let saved = saved.as_array().expect("bookmark list");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["id"], ids[0].to_string());
    }

    #[tokio::test]
    async fn bookmarking_an_unknown_contest_is_not_found() {
        let (state, _, _) = state_with(StaticCredentials(Ok("t"))).await;
        let resp = app(state)
            .oneshot(request(
                "POST",
                &format!("/api/contests/{}/bookmark", Uuid::new_v4()),
                Some(Uuid::new_v4()),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"], "not_found");
    }

    #[tokio::test]
    async fn calendar_export_creates_one_event() {
        let (state, _, ids) = state_with(StaticCredentials(Ok("tok"))).await;
        let resp = app(state)
            .oneshot(request("POST", &format!("/api/contests/{}/calendar", ids[0]), Some(Uuid::new_v4())))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["id"], "tok:Codeforces Round 1061 (Div. 2)");
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_as_reauthentication_required() {
        let (state, _, ids) = state_with(StaticCredentials(Err(()))).await;
        let resp = app(state)
            .oneshot(request("POST", &format!("/api/contests/{}/calendar", ids[0]), Some(Uuid::new_v4())))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["error"], "reauthentication_required");
    }

    #[tokio::test]
    async fn ongoing_status_is_served_with_its_wire_name() {
        let (state, contests, _) = state_with(StaticCredentials(Ok("t"))).await;
        let id = contests.find_all().await.expect("find all")[0].id;
        contests.update_status(id, ContestStatus::OnGoing).await.expect("update status");
        let list = json_body(app(state).oneshot(request("GET", "/api/contests", None)).await.expect("response")).await;
        assert_eq!(list[0]["status"], "On-going");
    }

    #[test]
    fn display_offset_falls_back_to_utc_when_unrepresentable() {
        assert_eq!(display_offset(330), FixedOffset::east_opt(19_800).expect("IST offset"));
        assert_eq!(display_offset(-300), FixedOffset::west_opt(18_000).expect("EST offset"));
        assert_eq!(display_offset(i32::MAX), Utc.fix());
        assert_eq!(display_offset(24 * 60), Utc.fix());
    }
}
