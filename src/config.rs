//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::{Secret, SecretString};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::lifecycle::{CheckpointWindow, LifecycleWindows};
use crate::feed::{RetryPolicy, MAX_IDS_PER_REQUEST};

/// Latest minute a checkpoint window may reach (extra time plus stoppage).
pub const MAX_MATCH_MINUTE: u32 = 130;
const MAX_FEED_RETRIES: u32 = 10;
/// One week.
const MAX_GRACE_MINUTES: i64 = 7 * 24 * 60;

/// Top-level application configuration. Every section is optional.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub feed: FeedConfig,
    pub checkpoints: CheckpointsConfig,
    pub resolution: ResolutionConfig,
    pub storage: StorageConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub poll_interval_secs: u64,
    /// Consecutive failed feed polls before an operator alert is sent.
    pub failure_alert_threshold: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "MATCHDAY-001".to_string(),
            poll_interval_secs: 90,
            failure_alert_threshold: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Delay used when a rate-limit response carries no `Retry-After`.
    pub rate_limit_delay_secs: u64,
    pub max_rate_limit_waits: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v3.football.api-sports.io".to_string(),
            api_key_env: "API_KEY".to_string(),
            timeout_secs: 10,
            batch_size: MAX_IDS_PER_REQUEST,
            max_retries: 3,
            base_backoff_ms: 1000,
            rate_limit_delay_secs: 60,
            max_rate_limit_waits: 3,
        }
    }
}

impl FeedConfig {
    /// Batch size clamped to what the feed accepts per request.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_IDS_PER_REQUEST)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            default_rate_limit_delay: Duration::from_secs(self.rate_limit_delay_secs),
            max_rate_limit_waits: self.max_rate_limit_waits,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CheckpointsConfig {
    pub first_minute: u32,
    pub first_before: u32,
    pub first_after: u32,
    pub second_minute: u32,
    pub second_before: u32,
    pub second_after: u32,
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        Self {
            first_minute: 36,
            first_before: 1,
            first_after: 1,
            second_minute: 80,
            second_before: 1,
            second_after: 1,
        }
    }
}

impl CheckpointsConfig {
    pub fn windows(&self) -> LifecycleWindows {
        LifecycleWindows {
            first: CheckpointWindow::around(self.first_minute, self.first_before, self.first_after),
            second: CheckpointWindow::around(self.second_minute, self.second_before, self.second_after),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Pending decisions younger than this are not looked up.
    pub grace_minutes: i64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { grace_minutes: 15 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    /// Use the in-process store (dry runs; nothing survives a restart).
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://matchday.db".to_string(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token_env: Some("TELEGRAM_TOKEN".to_string()),
            telegram_chat_id_env: Some("TELEGRAM_CHAT_ID".to_string()),
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.agent.poll_interval_secs > 0, "agent.poll_interval_secs must be positive");
        anyhow::ensure!(
            self.feed.max_retries <= MAX_FEED_RETRIES,
            "feed.max_retries must be at most {MAX_FEED_RETRIES}"
        );
        anyhow::ensure!(
            (0..=MAX_GRACE_MINUTES).contains(&self.resolution.grace_minutes),
            "resolution.grace_minutes must be within 0..={MAX_GRACE_MINUTES}"
        );

        let c = &self.checkpoints;
        for (name, minute, after) in [
            ("first", c.first_minute, c.first_after),
            ("second", c.second_minute, c.second_after),
        ] {
            let end = u64::from(minute) + u64::from(after);
            anyhow::ensure!(
                end <= u64::from(MAX_MATCH_MINUTE),
                "{name} checkpoint window ends after minute {MAX_MATCH_MINUTE}"
            );
        }
        c.windows().validate()?;
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an optional env-var reference to a secret, if set and non-empty.
    pub fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
        env_name
            .and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.trim().is_empty())
            .map(Secret::new)
    }
}
