//! Core domain model for ccal: contests, platforms, the status lifecycle and
//! duration display formatting.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ccal-core";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContestError {
    #[error("contest `{name}` ends at {end_time} which is not after its start {start_time}")]
    InvalidWindow {
        name: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    #[error("contest `{name}` has {field} {value} outside the representable range")]
    OutOfRange {
        name: String,
        field: &'static str,
        value: i64,
    },
    #[error("contest name is empty")]
    EmptyName,
    #[error("unknown platform `{0}`")]
    UnknownPlatform(String),
    #[error("unknown contest status `{0}`")]
    UnknownStatus(String),
}

/// Upstream source a contest was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Codeforces,
    LeetCode,
    HackerEarth,
    TopCoder,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Codeforces,
        Platform::LeetCode,
        Platform::HackerEarth,
        Platform::TopCoder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Codeforces => "Codeforces",
            Platform::LeetCode => "LeetCode",
            Platform::HackerEarth => "HackerEarth",
            Platform::TopCoder => "TopCoder",
        }
    }

    /// Lowercase identifier used in `sources.yaml` and log fields.
    pub fn source_id(&self) -> &'static str {
        match self {
            Platform::Codeforces => "codeforces",
            Platform::LeetCode => "leetcode",
            Platform::HackerEarth => "hackerearth",
            Platform::TopCoder => "topcoder",
        }
    }

    pub fn from_source_id(source_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.source_id() == source_id)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ContestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s || p.source_id() == s)
            .ok_or_else(|| ContestError::UnknownPlatform(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContestStatus {
    Upcoming,
    #[serde(rename = "On-going")]
    OnGoing,
    Past,
}

impl ContestStatus {
    /// Status a contest with the given window has at `now`.
    pub fn at(now: DateTime<Utc>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        if now >= end_time {
            ContestStatus::Past
        } else if now >= start_time {
            ContestStatus::OnGoing
        } else {
            ContestStatus::Upcoming
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContestStatus::Past)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Upcoming => "Upcoming",
            ContestStatus::OnGoing => "On-going",
            ContestStatus::Past => "Past",
        }
    }
}

impl fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContestStatus {
    type Err = ContestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Upcoming" => Ok(ContestStatus::Upcoming),
            "On-going" => Ok(ContestStatus::OnGoing),
            "Past" => Ok(ContestStatus::Past),
            other => Err(ContestError::UnknownStatus(other.to_string())),
        }
    }
}

/// Natural identity of a contest: same name scheduled at the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContestKey {
    pub name: String,
    pub start_time: DateTime<Utc>,
}

/// Normalized, not yet persisted contest produced by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestDraft {
    pub name: String,
    pub platform: Platform,
    pub duration: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ContestStatus,
    pub url: String,
}

impl ContestDraft {
    /// Builds a draft, deriving `duration` from the window and `status` from `observed_at`.
    pub fn new(
        name: impl Into<String>,
        platform: Platform,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        url: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ContestError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ContestError::EmptyName);
        }
        if end_time <= start_time {
            return Err(ContestError::InvalidWindow {
                name,
                start_time,
                end_time,
            });
        }
        Ok(Self {
            duration: format_duration(Some(seconds_between(start_time, end_time))),
            status: ContestStatus::at(observed_at, start_time, end_time),
            name,
            platform,
            start_time,
            end_time,
            url: url.into(),
        })
    }

    pub fn key(&self) -> ContestKey {
        ContestKey {
            name: self.name.clone(),
            start_time: self.start_time,
        }
    }
}

/// Persisted contest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    pub id: Uuid,
    pub name: String,
    pub platform: Platform,
    pub duration: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ContestStatus,
    pub url: String,
    pub solution_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contest {
    pub fn from_draft(id: Uuid, draft: ContestDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            platform: draft.platform,
            duration: draft.duration,
            start_time: draft.start_time,
            end_time: draft.end_time,
            status: draft.status,
            url: draft.url,
            solution_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ContestKey {
        ContestKey {
            name: self.name.clone(),
            start_time: self.start_time,
        }
    }

    pub fn target_status(&self, now: DateTime<Utc>) -> ContestStatus {
        ContestStatus::at(now, self.start_time, self.end_time)
    }
}

/// OAuth token pair held for a user by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    /// Tokens without a known expiry are treated as valid until rejected upstream.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Whole seconds from `start` to `end`, truncated toward zero.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds()
}

/// Compact, locale-independent rendering of a duration in seconds.
///
/// `None` and non-positive inputs render as the empty string. From one day on
/// only days and hours are shown (`"1d 1h"`); below that hours and minutes,
/// each omitted when zero (`"1h"`, `"1h 30m"`, `"1m"`).
pub fn format_duration(seconds: Option<i64>) -> String {
    let seconds = match seconds {
        Some(s) if s > 0 => s,
        _ => return String::new(),
    };

    let total_hours = seconds / 3600;
    if total_hours >= 24 {
        let days = total_hours / 24;
        let hours = total_hours % 24;
        return if hours > 0 {
            format!("{days}d {hours}h")
        } else {
            format!("{days}d")
        };
    }

    let minutes = (seconds % 3600) / 60;
    let mut parts = Vec::with_capacity(2);
    if total_hours > 0 {
        parts.push(format!("{total_hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

/// Source of "now" for everything that compares against wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}
