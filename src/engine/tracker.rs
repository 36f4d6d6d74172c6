//! Match tracker: applies lifecycle transitions to the store.
//!
//! `lifecycle::evaluate` decides; this module performs the writes and the
//! notification in an order that survives a crash at any step:
//!
//! - placing a decision: the state flags and the pending row in one atomic
//!   `place_decision` write, then the notification;
//! - half-time resolution: notification, then archive, then the state flags.
//!
//! A failed placement writes nothing, so the flags and the open decisions
//! always agree. A crash during half-time resolution leaves the flags unset
//! and the next poll repeats the step. The worst case is a duplicate
//! message, never a duplicate decision.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::lifecycle::{self, Effect, LifecycleWindows};
use crate::notify::{messages, send_best_effort, Notifier};
use crate::storage::{ArchiveResult, DecisionStore};
use crate::types::{
    DecisionKind, FixtureSnapshot, MatchStatePatch, MatchdayError, Outcome, PendingDecision, Score,
};

/// What happened to one fixture during a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Nothing to write.
    Unchanged,
    /// Only the state document changed (creation or a skipped checkpoint).
    StateUpdated,
    Placed(DecisionKind),
    ResolvedAtHalfTime(Outcome),
}

pub struct MatchTracker {
    store: Arc<dyn DecisionStore>,
    notifier: Arc<dyn Notifier>,
    windows: LifecycleWindows,
}

impl MatchTracker {
    pub fn new(
        store: Arc<dyn DecisionStore>,
        notifier: Arc<dyn Notifier>,
        windows: LifecycleWindows,
    ) -> Self {
        Self {
            store,
            notifier,
            windows,
        }
    }

    /// Evaluate one snapshot and persist the result.
    ///
    /// On a storage error nothing after the failed write happens; the
    /// caller logs it and the fixture is retried on the next poll.
    pub async fn process(
        &self,
        snapshot: &FixtureSnapshot,
        now: DateTime<Utc>,
    ) -> Result<TrackOutcome, MatchdayError> {
        let fixture_id = snapshot.fixture_id;
        let existing = self.store.get_state(fixture_id).await?;

        let transition = lifecycle::evaluate(snapshot, existing.as_ref(), &self.windows, now);
        if transition.is_noop() {
            return Ok(TrackOutcome::Unchanged);
        }

        match transition.effect {
            Effect::NoOp => {
                self.store.merge_state(fixture_id, &transition.patch).await?;
                debug!(
                    fixture_id,
                    stage = ?transition.state.stage(),
                    "Match state updated"
                );
                Ok(TrackOutcome::StateUpdated)
            }
            Effect::PlaceDecision(decision) => {
                self.place(snapshot, &decision, &transition.patch).await?;
                Ok(TrackOutcome::Placed(decision.kind))
            }
            Effect::ResolveCheckpoint1 { outcome, half_time } => {
                self.resolve_primary(snapshot, outcome, &half_time, &transition.patch, now)
                    .await?;
                Ok(TrackOutcome::ResolvedAtHalfTime(outcome))
            }
        }
    }

    async fn place(
        &self,
        snapshot: &FixtureSnapshot,
        decision: &PendingDecision,
        patch: &MatchStatePatch,
    ) -> Result<(), MatchdayError> {
        self.store.place_decision(decision.fixture_id, patch, decision).await?;

        info!(
            fixture_id = decision.fixture_id,
            kind = %decision.kind,
            category = decision.category.as_deref().unwrap_or("-"),
            minute = ?snapshot.minute,
            score = %snapshot.goals,
            "Decision placed"
        );

        let text = messages::decision_placed(decision, snapshot.minute);
        send_best_effort(self.notifier.as_ref(), &text).await;
        Ok(())
    }

    async fn resolve_primary(
        &self,
        snapshot: &FixtureSnapshot,
        outcome: Outcome,
        half_time: &Score,
        patch: &MatchStatePatch,
        now: DateTime<Utc>,
    ) -> Result<(), MatchdayError> {
        let fixture_id = snapshot.fixture_id;

        // Already archived by an earlier run that crashed before the flags.
        if let Some(pending) = self.store.get_pending(fixture_id, DecisionKind::Primary).await? {
            let text = messages::half_time_result(&pending, half_time, outcome);
            send_best_effort(self.notifier.as_ref(), &text).await;

            match self
                .store
                .move_to_archived(fixture_id, DecisionKind::Primary, outcome, now)
                .await?
            {
                ArchiveResult::Archived(_) => info!(
                    fixture_id,
                    outcome = %outcome,
                    half_time = %half_time,
                    "Primary decision resolved at half-time"
                ),
                ArchiveResult::NotPending => warn!(
                    fixture_id,
                    "Primary decision vanished before half-time archival"
                ),
            }
        }

        self.store.merge_state(fixture_id, patch).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
