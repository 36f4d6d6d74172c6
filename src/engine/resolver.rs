//! Batch resolver for open decisions.
//!
//! Each cycle: list every pending decision, skip the ones still inside the
//! grace period, look the rest up in feed-sized batches, and archive those
//! whose fixture has finished. Unfinished or missing fixtures are left for
//! the next cycle. A failed batch only delays its own fixtures.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::feed::ScoreFeed;
use crate::notify::{messages, send_best_effort, Notifier};
use crate::storage::{ArchiveResult, DecisionStore};
use crate::strategy;
use crate::types::{
    Category, DecisionKind, FixtureId, FixtureSnapshot, MatchdayError, Outcome, PendingDecision,
};

/// Counters for one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Open decisions old enough to be looked up.
    pub due: usize,
    /// Decisions still inside the grace period.
    pub deferred: usize,
    pub archived: usize,
    pub wins: usize,
    pub losses: usize,
    /// Archived with `Outcome::Error`.
    pub errors: usize,
    /// Fixture not finished or absent from the feed response.
    pub unfinished: usize,
    /// Feed batches that failed after retries.
    pub failed_batches: usize,
    /// Decisions whose archive write failed; retried next cycle.
    pub store_failures: usize,
}

/// Verdict for one decision plus a diagnostic when it is an error.
struct Verdict {
    outcome: Outcome,
    reason: Option<String>,
}

impl Verdict {
    fn decided(outcome: Outcome, reason: &str) -> Self {
        Self {
            outcome,
            reason: (outcome == Outcome::Error).then(|| reason.to_string()),
        }
    }

    fn error(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Error,
            reason: Some(reason.into()),
        }
    }
}

pub struct Resolver {
    feed: Arc<dyn ScoreFeed>,
    store: Arc<dyn DecisionStore>,
    notifier: Arc<dyn Notifier>,
    batch_size: usize,
    grace: Duration,
}

impl Resolver {
    pub fn new(
        feed: Arc<dyn ScoreFeed>,
        store: Arc<dyn DecisionStore>,
        notifier: Arc<dyn Notifier>,
        batch_size: usize,
        grace: Duration,
    ) -> Self {
        Self {
            feed,
            store,
            notifier,
            batch_size: batch_size.max(1),
            grace,
        }
    }

    /// Reconcile every due decision whose fixture has finished.
    ///
    /// Fails only if the pending decisions cannot be listed.
    pub async fn resolve_all(&self, now: DateTime<Utc>) -> Result<ResolutionReport, MatchdayError> {
        let pending = self.store.list_pending(None).await?;
        let mut report = ResolutionReport::default();

        let (due, deferred): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|d| d.placed_at + self.grace <= now);
        report.due = due.len();
        report.deferred = deferred.len();

        if due.is_empty() {
            return Ok(report);
        }

        let ids: Vec<FixtureId> = due
            .iter()
            .map(|d| d.fixture_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let snapshots = self.fetch_batches(&ids, &mut report).await;

        for decision in &due {
            let finished = snapshots
                .get(&decision.fixture_id)
                .filter(|s| s.phase.is_finished());
            let Some(snapshot) = finished else {
                report.unfinished += 1;
                continue;
            };
            self.resolve_one(decision, snapshot, now, &mut report).await;
        }

        info!(
            due = report.due,
            deferred = report.deferred,
            archived = report.archived,
            wins = report.wins,
            losses = report.losses,
            errors = report.errors,
            unfinished = report.unfinished,
            "Resolution pass complete"
        );

        Ok(report)
    }

    async fn fetch_batches(
        &self,
        ids: &[FixtureId],
        report: &mut ResolutionReport,
    ) -> HashMap<FixtureId, FixtureSnapshot> {
        let mut snapshots = HashMap::new();
        for chunk in ids.chunks(self.batch_size) {
            match self.feed.fetch_by_ids(chunk).await {
                Ok(found) => snapshots.extend(found),
                Err(e) => {
                    report.failed_batches += 1;
                    warn!(
                        feed = self.feed.name(),
                        batch = chunk.len(),
                        error = %e,
                        "Resolution batch lookup failed; retrying next cycle"
                    );
                }
            }
        }
        snapshots
    }

    async fn resolve_one(
        &self,
        decision: &PendingDecision,
        snapshot: &FixtureSnapshot,
        now: DateTime<Utc>,
        report: &mut ResolutionReport,
    ) {
        let verdict = self.judge(decision, snapshot).await;

        let text = match &verdict.reason {
            Some(reason) => messages::resolution_error(decision, reason),
            None => messages::full_time_result(decision, &snapshot.goals, verdict.outcome),
        };
        send_best_effort(self.notifier.as_ref(), &text).await;

        match self
            .store
            .move_to_archived(decision.fixture_id, decision.kind, verdict.outcome, now)
            .await
        {
            Ok(ArchiveResult::Archived(_)) => {
                report.archived += 1;
                match verdict.outcome {
                    Outcome::Win => report.wins += 1,
                    Outcome::Loss => report.losses += 1,
                    Outcome::Error => report.errors += 1,
                }
                info!(
                    fixture_id = decision.fixture_id,
                    kind = %decision.kind,
                    outcome = %verdict.outcome,
                    final_score = %snapshot.goals,
                    "Decision archived"
                );
            }
            Ok(ArchiveResult::NotPending) => {
                debug!(
                    fixture_id = decision.fixture_id,
                    kind = %decision.kind,
                    "Decision already archived"
                );
            }
            Err(e) => {
                report.store_failures += 1;
                error!(
                    fixture_id = decision.fixture_id,
                    kind = %decision.kind,
                    error = %e,
                    "Archive write failed; retrying next cycle"
                );
            }
        }
    }

    async fn judge(&self, decision: &PendingDecision, snapshot: &FixtureSnapshot) -> Verdict {
        match decision.kind {
            DecisionKind::Primary => judge_primary(decision, snapshot),
            DecisionKind::Chase => {
                let checkpoint2 = match &decision.checkpoint2_score {
                    Some(score) => Some(score.clone()),
                    None => self.checkpoint2_from_state(decision.fixture_id).await,
                };
                match checkpoint2 {
                    Some(cp2) => Verdict::decided(strategy::chase_outcome(&cp2, &snapshot.goals), ""),
                    None => Verdict::error("no checkpoint-2 score recorded"),
                }
            }
        }
    }

    async fn checkpoint2_from_state(&self, fixture_id: FixtureId) -> Option<String> {
        match self.store.get_state(fixture_id).await {
            Ok(state) => state.and_then(|s| s.checkpoint2_score),
            Err(e) => {
                warn!(fixture_id, error = %e, "Could not read match state for chase context");
                None
            }
        }
    }
}

fn judge_primary(decision: &PendingDecision, snapshot: &FixtureSnapshot) -> Verdict {
    let Some(tag) = decision.category.as_deref() else {
        return Verdict::error("primary decision has no category");
    };
    let category = match tag.parse::<Category>() {
        Ok(c) => c,
        Err(e) => return Verdict::error(e),
    };

    let outcome = strategy::full_time_outcome(
        category,
        decision.checkpoint1_score.as_deref(),
        &snapshot.goals,
        snapshot.halftime.as_ref(),
    );
    let reason = if decision.checkpoint1_score.is_none() {
        "no checkpoint-1 score recorded"
    } else {
        "feed reported no half-time tally"
    };
    Verdict::decided(outcome, reason)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
