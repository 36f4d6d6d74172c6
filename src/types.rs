//! Shared types for the MATCHDAY tracker.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that the feed, storage, strategy and
//! engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable external fixture identifier (API-Football `fixture.id`).
pub type FixtureId = i64;

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// A goal tally. Rendered (and compared) as the string `"H-A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Build from nullable feed goal counts; absent counts are treated as 0.
    pub fn from_goals(home: Option<u32>, away: Option<u32>) -> Self {
        Self {
            home: home.unwrap_or(0),
            away: away.unwrap_or(0),
        }
    }

    pub fn total(&self) -> u32 {
        self.home + self.away
    }

    pub fn is_draw(&self) -> bool {
        self.home == self.away
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

// ---------------------------------------------------------------------------
// Match phase
// ---------------------------------------------------------------------------

/// Coarse match phase derived from the feed's short status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    PreMatch,
    FirstHalf,
    HalfTime,
    SecondHalf,
    Finished,
    Other,
}

impl MatchPhase {
    /// Map an API-Football `fixture.status.short` code.
    pub fn from_status_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "TBD" | "NS" => Self::PreMatch,
            "1H" => Self::FirstHalf,
            "HT" => Self::HalfTime,
            "2H" => Self::SecondHalf,
            "FT" | "AET" | "PEN" => Self::Finished,
            _ => Self::Other,
        }
    }

    pub fn is_finished(&self) -> bool {
        *self == Self::Finished
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreMatch => write!(f, "pre-match"),
            Self::FirstHalf => write!(f, "first-half"),
            Self::HalfTime => write!(f, "half-time"),
            Self::SecondHalf => write!(f, "second-half"),
            Self::Finished => write!(f, "finished"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture snapshot
// ---------------------------------------------------------------------------

/// One fixture as reported by a single feed poll. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSnapshot {
    pub fixture_id: FixtureId,
    /// Minutes elapsed; absent before kick-off and for some feed states.
    pub minute: Option<u32>,
    pub phase: MatchPhase,
    /// Raw short status code, kept for logging.
    pub status_code: String,
    pub home_team: String,
    pub away_team: String,
    pub league_name: String,
    pub league_id: i64,
    pub goals: Score,
    /// Half-time tally, once the feed reports it.
    pub halftime: Option<Score>,
}

impl FixtureSnapshot {
    /// Human-readable "Home vs Away".
    pub fn match_name(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Helper to build a test snapshot with sensible defaults.
    #[cfg(test)]
    pub fn sample(fixture_id: FixtureId, phase: MatchPhase, minute: Option<u32>, goals: Score) -> Self {
        Self {
            fixture_id,
            minute,
            phase,
            status_code: "1H".to_string(),
            home_team: "Home FC".to_string(),
            away_team: "Away United".to_string(),
            league_name: "Test League".to_string(),
            league_id: 39,
            goals,
            halftime: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint-1 categories
// ---------------------------------------------------------------------------

/// Classification of the tally observed at checkpoint 1. Decides which
/// resolution rule applies later (see `strategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Level score (1-1, 2-2, 3-3): wins if the tally holds to half-time.
    LevelHold,
    /// One-goal lead (1-0, 0-1, 2-1, 1-2): wins if the match is not drawn at full-time.
    NarrowLead,
    /// Goalless (0-0): wins if the match ends over the goal line.
    GoallessBreak,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LevelHold => "level_hold",
            Self::NarrowLead => "narrow_lead",
            Self::GoallessBreak => "goalless_break",
        }
    }

    /// Whether the outcome is fully determined by the half-time tally.
    pub fn resolves_at_half_time(&self) -> bool {
        matches!(self, Self::LevelHold)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "level_hold" => Ok(Self::LevelHold),
            "narrow_lead" => Ok(Self::NarrowLead),
            "goalless_break" => Ok(Self::GoallessBreak),
            other => Err(format!("Unknown decision category: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision kind & outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    /// Placed at checkpoint 1.
    Primary,
    /// Placed at checkpoint 2 after a lost primary.
    Chase,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Chase => "chase",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "chase" => Ok(Self::Chase),
            other => Err(format!("Unknown decision kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    /// Could not be reconciled (unknown category, missing context).
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Error => "error",
        }
    }

    pub fn from_won(won: bool) -> Self {
        if won {
            Self::Win
        } else {
            Self::Loss
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" => Ok(Self::Win),
            "loss" => Ok(Self::Loss),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown outcome: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Match state
// ---------------------------------------------------------------------------

/// Persisted per-fixture lifecycle state. Only ever merged, never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    pub checkpoint1_evaluated: bool,
    pub checkpoint1_score: Option<String>,
    pub checkpoint1_category: Option<Category>,
    pub checkpoint1_outcome_known: bool,
    pub checkpoint1_won: Option<bool>,
    pub checkpoint2_evaluated: bool,
    pub checkpoint2_score: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// Partial update of a `MatchState`. `None` fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatePatch {
    pub checkpoint1_evaluated: Option<bool>,
    pub checkpoint1_score: Option<String>,
    pub checkpoint1_category: Option<Category>,
    pub checkpoint1_outcome_known: Option<bool>,
    pub checkpoint1_won: Option<bool>,
    pub checkpoint2_evaluated: Option<bool>,
    pub checkpoint2_score: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Derived lifecycle position of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStage {
    Checkpoint1Pending,
    /// Evaluated, tally matched no category. Terminal.
    Checkpoint1Skipped,
    /// Primary decision placed, outcome not yet known to the state machine.
    Checkpoint1Open,
    /// Terminal.
    Checkpoint1Won,
    Checkpoint1Lost,
    /// Chase placed. Terminal for the state machine.
    ChaseOpen,
}

impl MatchState {
    /// State of a fixture on first observation: every flag false.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            checkpoint1_evaluated: false,
            checkpoint1_score: None,
            checkpoint1_category: None,
            checkpoint1_outcome_known: false,
            checkpoint1_won: None,
            checkpoint2_evaluated: false,
            checkpoint2_score: None,
            last_update: now,
        }
    }

    /// Merge a patch into this state.
    pub fn apply(&mut self, patch: &MatchStatePatch) {
        if let Some(v) = patch.checkpoint1_evaluated {
            self.checkpoint1_evaluated = v;
        }
        if let Some(ref v) = patch.checkpoint1_score {
            self.checkpoint1_score = Some(v.clone());
        }
        if let Some(v) = patch.checkpoint1_category {
            self.checkpoint1_category = Some(v);
        }
        if let Some(v) = patch.checkpoint1_outcome_known {
            self.checkpoint1_outcome_known = v;
        }
        if let Some(v) = patch.checkpoint1_won {
            self.checkpoint1_won = Some(v);
        }
        if let Some(v) = patch.checkpoint2_evaluated {
            self.checkpoint2_evaluated = v;
        }
        if let Some(ref v) = patch.checkpoint2_score {
            self.checkpoint2_score = Some(v.clone());
        }
        if let Some(v) = patch.last_update {
            self.last_update = v;
        }
    }

    pub fn stage(&self) -> MatchStage {
        if self.checkpoint2_evaluated {
            return MatchStage::ChaseOpen;
        }
        if !self.checkpoint1_evaluated {
            return MatchStage::Checkpoint1Pending;
        }
        if self.checkpoint1_category.is_none() {
            return MatchStage::Checkpoint1Skipped;
        }
        match (self.checkpoint1_outcome_known, self.checkpoint1_won) {
            (true, Some(true)) => MatchStage::Checkpoint1Won,
            (true, Some(false)) => MatchStage::Checkpoint1Lost,
            _ => MatchStage::Checkpoint1Open,
        }
    }
}

impl MatchStatePatch {
    /// Patch that creates a fresh state document.
    pub fn creation(now: DateTime<Utc>) -> Self {
        Self {
            checkpoint1_evaluated: Some(false),
            checkpoint1_outcome_known: Some(false),
            checkpoint2_evaluated: Some(false),
            last_update: Some(now),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// An open simulated wager awaiting reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub fixture_id: FixtureId,
    pub kind: DecisionKind,
    /// Raw category tag (primary only). Kept as text so an unknown tag
    /// read back from storage can be archived as an error.
    pub category: Option<String>,
    pub match_name: String,
    pub league_name: String,
    pub league_id: i64,
    pub checkpoint1_score: Option<String>,
    pub checkpoint2_score: Option<String>,
    pub placed_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn primary(snapshot: &FixtureSnapshot, category: Category, now: DateTime<Utc>) -> Self {
        Self {
            fixture_id: snapshot.fixture_id,
            kind: DecisionKind::Primary,
            category: Some(category.as_str().to_string()),
            match_name: snapshot.match_name(),
            league_name: snapshot.league_name.clone(),
            league_id: snapshot.league_id,
            checkpoint1_score: Some(snapshot.goals.to_string()),
            checkpoint2_score: None,
            placed_at: now,
        }
    }

    pub fn chase(
        snapshot: &FixtureSnapshot,
        checkpoint1_score: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fixture_id: snapshot.fixture_id,
            kind: DecisionKind::Chase,
            category: None,
            match_name: snapshot.match_name(),
            league_name: snapshot.league_name.clone(),
            league_id: snapshot.league_id,
            checkpoint1_score,
            checkpoint2_score: Some(snapshot.goals.to_string()),
            placed_at: now,
        }
    }
}

/// A reconciled decision. Write-once audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedDecision {
    pub id: String,
    pub decision: PendingDecision,
    pub outcome: Outcome,
    pub resolved_at: DateTime<Utc>,
}

impl ArchivedDecision {
    pub fn new(decision: PendingDecision, outcome: Outcome, resolved_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            decision,
            outcome,
            resolved_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-level error for the tracker and resolver.
#[derive(Debug, thiserror::Error)]
pub enum MatchdayError {
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
