//! Score feed integrations.
//!
//! Defines the `ScoreFeed` trait, the feed error taxonomy and the bounded
//! retry loop shared by feed clients. The production implementation is
//! API-Football (`api_football`).

pub mod api_football;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{FixtureId, FixtureSnapshot};

/// Maximum fixture ids the feed accepts in one `ids=` query.
pub const MAX_IDS_PER_REQUEST: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// `retry_after` is `None` when the feed gave no delay hint.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Well-formed response carrying an API-level error.
    #[error("Feed API error: {0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl FeedError {
    /// Transient failures worth another attempt (rate limits are handled apart).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over live-score providers.
#[async_trait]
pub trait ScoreFeed: Send + Sync {
    /// All fixtures currently in play.
    async fn fetch_live(&self) -> Result<Vec<FixtureSnapshot>, FeedError>;

    /// Snapshots for specific fixtures, keyed by id. Ids the feed does not
    /// know are simply absent from the map.
    async fn fetch_by_ids(
        &self,
        ids: &[FixtureId],
    ) -> Result<HashMap<FixtureId, FixtureSnapshot>, FeedError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Bounds for `with_retry`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first for transient errors.
    pub max_retries: u32,
    /// First backoff; doubles each retry.
    pub base_backoff: Duration,
    /// Wait used when a rate-limit response carries no hint.
    pub default_rate_limit_delay: Duration,
    /// Rate-limit waits allowed before giving up on the call.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(1000),
            default_rate_limit_delay: Duration::from_secs(60),
            max_rate_limit_waits: 3,
        }
    }
}

impl RetryPolicy {
    /// No waiting at all. Used by tests.
    pub fn immediate() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::ZERO,
            default_rate_limit_delay: Duration::ZERO,
            max_rate_limit_waits: 3,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy's bounds
/// are exhausted. Rate limits wait for the hinted (or default) delay and
/// do not consume transient-error retries.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut retries = 0u32;
    let mut rate_limit_waits = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(FeedError::RateLimited { retry_after }) => {
                if rate_limit_waits >= policy.max_rate_limit_waits {
                    warn!(what, waits = rate_limit_waits, "Still rate limited, giving up");
                    return Err(FeedError::RateLimited { retry_after });
                }
                rate_limit_waits += 1;
                let delay = retry_after.unwrap_or(policy.default_rate_limit_delay);
                warn!(what, delay_secs = delay.as_secs(), "Feed rate limited, waiting");
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.base_backoff.saturating_mul(2u32.saturating_pow(retries - 1));
                debug!(what, attempt = retries, delay_ms = delay.as_millis() as u64, error = %e, "Retrying feed call");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
