use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ccal_storage::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::calendar::CalendarError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("contest {0} not found")]
    NotFound(Uuid),
    #[error("missing or invalid x-user-id header")]
    MissingViewer,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Calendar(CalendarError),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::MissingViewer => "missing_viewer",
            ApiError::Calendar(CalendarError::ReauthenticationRequired) => "reauthentication_required",
            ApiError::Calendar(CalendarError::NotConnected(_)) => "calendar_not_connected",
            ApiError::Store(_) | ApiError::Calendar(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MissingViewer
            | ApiError::Calendar(CalendarError::ReauthenticationRequired)
            | ApiError::Calendar(CalendarError::NotConnected(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) | ApiError::Calendar(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ContestNotFound(id) => ApiError::NotFound(id),
            other => ApiError::Store(other),
        }
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::Store(store) => store.into(),
            other => ApiError::Calendar(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = Json(json!({ "error": self.code(), "message": self.to_string() }));
        (status, body).into_response()
    }
}
