//! API-Football live score feed.
//!
//! API: `https://v3.football.api-sports.io/fixtures`
//! Auth: `x-apisports-key` header.
//! Queries used: `live=all` for in-play fixtures and `ids=1-2-3` (max 20 ids)
//! for final results.
//!
//! The API reports most failures as HTTP 200 with a non-empty `errors`
//! object; `errors.rateLimit` is treated like a 429.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{with_retry, FeedError, RetryPolicy, ScoreFeed, MAX_IDS_PER_REQUEST};
use crate::types::{FixtureId, FixtureSnapshot, MatchPhase, Score};

const FEED_NAME: &str = "api-football";

// ---------------------------------------------------------------------------
// API response types (API-Football JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    /// `[]` when fine, otherwise an object such as `{"rateLimit": "..."}`.
    #[serde(default)]
    errors: serde_json::Value,
    #[serde(default)]
    response: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiFixture {
    fixture: ApiFixtureInfo,
    league: ApiLeague,
    teams: ApiTeams,
    goals: ApiGoals,
    #[serde(default)]
    score: Option<ApiScore>,
}

#[derive(Debug, Deserialize)]
struct ApiFixtureInfo {
    id: FixtureId,
    status: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    short: String,
    #[serde(default)]
    elapsed: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiLeague {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTeams {
    home: ApiTeam,
    away: ApiTeam,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiGoals {
    #[serde(default)]
    home: Option<u32>,
    #[serde(default)]
    away: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiScore {
    #[serde(default)]
    halftime: Option<ApiGoals>,
}

impl From<ApiFixture> for FixtureSnapshot {
    fn from(api: ApiFixture) -> Self {
        let halftime = api
            .score
            .and_then(|s| s.halftime)
            .and_then(|g| Some(Score::new(g.home?, g.away?)));

        FixtureSnapshot {
            fixture_id: api.fixture.id,
            minute: api.fixture.status.elapsed,
            phase: MatchPhase::from_status_code(&api.fixture.status.short),
            status_code: api.fixture.status.short,
            home_team: api.teams.home.name,
            away_team: api.teams.away.name,
            league_name: api.league.name,
            league_id: api.league.id,
            goals: Score::from_goals(api.goals.home, api.goals.away),
            halftime,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Decode the response envelope, surfacing API-level errors.
fn parse_envelope(body: &str) -> Result<Vec<serde_json::Value>, FeedError> {
    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|e| FeedError::Malformed(e.to_string()))?;

    match &envelope.errors {
        serde_json::Value::Object(map) if !map.is_empty() => {
            if map.contains_key("rateLimit") {
                return Err(FeedError::RateLimited { retry_after: None });
            }
            // `requests` is the daily quota: waiting minutes will not help.
            Err(FeedError::Api(envelope.errors.to_string()))
        }
        serde_json::Value::Array(items) if !items.is_empty() => {
            Err(FeedError::Api(envelope.errors.to_string()))
        }
        _ => Ok(envelope.response),
    }
}

/// Convert raw fixture entries, skipping (and logging) malformed ones.
fn parse_fixtures(items: Vec<serde_json::Value>) -> Vec<FixtureSnapshot> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ApiFixture>(item) {
            Ok(api) => Some(FixtureSnapshot::from(api)),
            Err(e) => {
                warn!(error = %e, "Skipping malformed fixture entry");
                None
            }
        })
        .collect()
}

/// `Retry-After` in seconds, if present and numeric.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// `ids` query value: ids joined by `-`.
fn ids_param(ids: &[FixtureId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join("-")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiFootballClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl ApiFootballClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("MATCHDAY/0.1.0")
            .build()
            .context("Failed to build API-Football HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }

    /// One `/fixtures` request, no retries.
    async fn request_once(&self, query: &[(&str, String)]) -> Result<Vec<serde_json::Value>, FeedError> {
        let url = format!("{}/fixtures", self.base_url);
        debug!(url = %url, ?query, "Fetching fixtures");

        let resp = self
            .http
            .get(&url)
            .header("x-apisports-key", self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(FeedError::RateLimited {
                retry_after: parse_retry_after(resp.headers()),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(FeedError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_envelope(&body)
    }

    async fn fetch_fixtures(&self, query: Vec<(&str, String)>) -> Result<Vec<FixtureSnapshot>, FeedError> {
        let items = with_retry(&self.retry, "fixtures", || self.request_once(&query)).await?;
        Ok(parse_fixtures(items))
    }
}

#[async_trait]
impl ScoreFeed for ApiFootballClient {
    async fn fetch_live(&self) -> Result<Vec<FixtureSnapshot>, FeedError> {
        let fixtures = self.fetch_fixtures(vec![("live", "all".to_string())]).await?;
        info!(count = fixtures.len(), "Live fixtures fetched");
        Ok(fixtures)
    }

    async fn fetch_by_ids(
        &self,
        ids: &[FixtureId],
    ) -> Result<HashMap<FixtureId, FixtureSnapshot>, FeedError> {
        let mut out = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let fixtures = self.fetch_fixtures(vec![("ids", ids_param(chunk))]).await?;
            out.extend(fixtures.into_iter().map(|f| (f.fixture_id, f)));
        }
        debug!(requested = ids.len(), returned = out.len(), "Fixtures fetched by id");
        Ok(out)
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
