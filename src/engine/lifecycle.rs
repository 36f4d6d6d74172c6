//! Per-fixture lifecycle state machine.
//!
//! Pure decision logic: given the latest snapshot of a fixture and its
//! persisted `MatchState` (if any), work out the state patch to merge and
//! at most one side effect. No I/O happens here; `tracker` applies the
//! result. Duplicate polls are harmless because every checkpoint is
//! guarded by a persisted `*_evaluated` flag, never by in-process memory.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::strategy;
use crate::types::{
    FixtureSnapshot, MatchPhase, MatchState, MatchStatePatch, MatchdayError, Outcome,
    PendingDecision, Score,
};

// ---------------------------------------------------------------------------
// Checkpoint windows
// ---------------------------------------------------------------------------

/// Closed minute interval `[start, end]` in which a checkpoint may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointWindow {
    pub start: u32,
    pub end: u32,
}

impl CheckpointWindow {
    /// Window from `minute - before` to `minute + after`, both inclusive.
    pub fn around(minute: u32, before: u32, after: u32) -> Self {
        Self {
            start: minute.saturating_sub(before),
            end: minute.saturating_add(after),
        }
    }

    pub fn contains(&self, minute: u32) -> bool {
        (self.start..=self.end).contains(&minute)
    }
}

/// The two checkpoint windows of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleWindows {
    pub first: CheckpointWindow,
    pub second: CheckpointWindow,
}

impl Default for LifecycleWindows {
    fn default() -> Self {
        Self {
            first: CheckpointWindow::around(36, 1, 1),
            second: CheckpointWindow::around(80, 1, 1),
        }
    }
}

impl LifecycleWindows {
    /// Checkpoint 1 must close before checkpoint 2 opens.
    pub fn validate(&self) -> Result<(), MatchdayError> {
        if self.first.start > self.first.end || self.second.start > self.second.end {
            return Err(MatchdayError::Config("Checkpoint window start after end".into()));
        }
        if self.first.end >= self.second.start {
            return Err(MatchdayError::Config(format!(
                "Checkpoint windows overlap: {}..={} and {}..={}",
                self.first.start, self.first.end, self.second.start, self.second.end
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    NoOp,
    /// Open a pending decision (primary at checkpoint 1, chase at checkpoint 2).
    PlaceDecision(PendingDecision),
    /// Archive the open primary decision with a half-time outcome.
    ResolveCheckpoint1 { outcome: Outcome, half_time: Score },
}

/// Result of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State after the patch is applied.
    pub state: MatchState,
    /// Fields to merge into the stored document. Empty means nothing to write.
    pub patch: MatchStatePatch,
    pub effect: Effect,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.patch.is_empty() && self.effect == Effect::NoOp
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate a snapshot against the persisted state of its fixture.
pub fn evaluate(
    snapshot: &FixtureSnapshot,
    state: Option<&MatchState>,
    windows: &LifecycleWindows,
    now: DateTime<Utc>,
) -> Transition {
    let (current, mut patch) = match state {
        Some(s) => (s.clone(), MatchStatePatch::default()),
        None => (MatchState::fresh(now), MatchStatePatch::creation(now)),
    };

    let effect = decide(snapshot, &current, windows, now, &mut patch);

    if effect != Effect::NoOp {
        patch.last_update = Some(now);
    }
    let mut next = current;
    next.apply(&patch);

    Transition {
        state: next,
        patch,
        effect,
    }
}

fn decide(
    snapshot: &FixtureSnapshot,
    state: &MatchState,
    windows: &LifecycleWindows,
    now: DateTime<Utc>,
    patch: &mut MatchStatePatch,
) -> Effect {
    if snapshot.phase == MatchPhase::HalfTime {
        return resolve_at_half_time(snapshot, state, patch);
    }

    let Some(minute) = snapshot.minute else {
        return Effect::NoOp;
    };

    match snapshot.phase {
        MatchPhase::FirstHalf
            if !state.checkpoint1_evaluated && windows.first.contains(minute) =>
        {
            checkpoint1(snapshot, now, patch)
        }
        MatchPhase::SecondHalf
            if !state.checkpoint2_evaluated
                && state.checkpoint1_outcome_known
                && state.checkpoint1_won == Some(false)
                && windows.second.contains(minute) =>
        {
            checkpoint2(snapshot, state, now, patch)
        }
        _ => Effect::NoOp,
    }
}

fn checkpoint1(snapshot: &FixtureSnapshot, now: DateTime<Utc>, patch: &mut MatchStatePatch) -> Effect {
    patch.checkpoint1_evaluated = Some(true);

    let Some(category) = strategy::classify(&snapshot.goals) else {
        debug!(
            fixture_id = snapshot.fixture_id,
            score = %snapshot.goals,
            "Checkpoint 1 skipped: tally matches no category"
        );
        // Terminal: the flag alone must still be written.
        patch.last_update = Some(now);
        return Effect::NoOp;
    };

    patch.checkpoint1_score = Some(snapshot.goals.to_string());
    patch.checkpoint1_category = Some(category);
    Effect::PlaceDecision(PendingDecision::primary(snapshot, category, now))
}

fn checkpoint2(
    snapshot: &FixtureSnapshot,
    state: &MatchState,
    now: DateTime<Utc>,
    patch: &mut MatchStatePatch,
) -> Effect {
    patch.checkpoint2_evaluated = Some(true);
    patch.checkpoint2_score = Some(snapshot.goals.to_string());
    Effect::PlaceDecision(PendingDecision::chase(
        snapshot,
        state.checkpoint1_score.clone(),
        now,
    ))
}

fn resolve_at_half_time(
    snapshot: &FixtureSnapshot,
    state: &MatchState,
    patch: &mut MatchStatePatch,
) -> Effect {
    if !state.checkpoint1_evaluated || state.checkpoint1_outcome_known {
        return Effect::NoOp;
    }
    let (Some(category), Some(cp1)) = (state.checkpoint1_category, state.checkpoint1_score.as_deref())
    else {
        return Effect::NoOp;
    };
    if !category.resolves_at_half_time() {
        return Effect::NoOp;
    }

    let half_time = snapshot.goals;
    let outcome = strategy::half_time_outcome(cp1, &half_time);
    patch.checkpoint1_outcome_known = Some(true);
    patch.checkpoint1_won = Some(outcome == Outcome::Win);
    Effect::ResolveCheckpoint1 { outcome, half_time }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
