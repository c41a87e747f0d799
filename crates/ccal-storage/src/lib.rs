//! Persistence and outbound HTTP plumbing for ccal.
//!
//! `ContestStore`/`UserStore` are the seams the pipeline and the web layer
//! talk to; Postgres backs them in production, the memory variants back tests.

mod http;
mod memory;
mod postgres;
mod store;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RetryDisposition, SimpleTokenBucket, TokenBucketConfig,
};
pub use memory::{MemoryContestStore, MemoryUserStore};
pub use postgres::{connect, migrate, PgContestStore, PgUserStore};
pub use sqlx::PgPool;
pub use store::{ContestStore, StoreError, UpsertSummary, UserStore};

pub const CRATE_NAME: &str = "ccal-storage";
