//! Persistence layer.
//!
//! Three collections, all keyed by fixture id:
//! - match states (merge-only documents owned by the lifecycle machine),
//! - pending decisions (at most one per fixture and decision kind),
//! - archived decisions (append-only audit trail).
//!
//! `SqliteStore` is the durable implementation; `MemoryStore` keeps the
//! same contract in process for dry runs and tests.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    ArchivedDecision, DecisionKind, FixtureId, MatchState, MatchStatePatch, Outcome,
    PendingDecision,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A pending decision was written before its fixture had a state document.
    #[error("No match state for fixture {0}")]
    MissingState(FixtureId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record for fixture {fixture_id}: {message}")]
    Corrupt { fixture_id: FixtureId, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an archive attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveResult {
    Archived(ArchivedDecision),
    /// Nothing open for that fixture and kind (already archived or never placed).
    NotPending,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Passive ledger for lifecycle state and decisions. No business logic.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn get_state(&self, fixture_id: FixtureId) -> Result<Option<MatchState>, StoreError>;

    /// Merge `patch` into the fixture's state, creating the document if needed.
    /// Fields absent from the patch are never touched.
    async fn merge_state(&self, fixture_id: FixtureId, patch: &MatchStatePatch) -> Result<(), StoreError>;

    /// Every open decision, optionally filtered by kind, ordered by fixture id.
    async fn list_pending(&self, kind: Option<DecisionKind>) -> Result<Vec<PendingDecision>, StoreError>;

    async fn get_pending(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
    ) -> Result<Option<PendingDecision>, StoreError>;

    /// Open (or idempotently re-write) a decision. Fails with
    /// `StoreError::MissingState` if the fixture has no state document.
    async fn put_pending(&self, decision: &PendingDecision) -> Result<(), StoreError>;

    /// Merge `patch` and open `decision` as one atomic write: either the
    /// fixture's flags and the pending row both land, or neither does.
    /// Creates the state document if needed.
    async fn place_decision(
        &self,
        fixture_id: FixtureId,
        patch: &MatchStatePatch,
        decision: &PendingDecision,
    ) -> Result<(), StoreError>;

    /// Atomically move the open decision for `(fixture_id, kind)` to the
    /// archive. All-or-nothing with respect to that one decision.
    async fn move_to_archived(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
        outcome: Outcome,
        resolved_at: DateTime<Utc>,
    ) -> Result<ArchiveResult, StoreError>;

    /// Audit read of archived decisions for one fixture.
    async fn archived_for(&self, fixture_id: FixtureId) -> Result<Vec<ArchivedDecision>, StoreError>;
}

// ---------------------------------------------------------------------------
// Shared contract tests
// ---------------------------------------------------------------------------

/// Behaviour every `DecisionStore` must share. Run by each implementation.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::types::{Category, FixtureSnapshot, MatchPhase, Score};

    fn decision(fixture_id: FixtureId, kind: DecisionKind) -> PendingDecision {
        let snap = FixtureSnapshot::sample(fixture_id, MatchPhase::FirstHalf, Some(36), Score::new(1, 1));
        match kind {
            DecisionKind::Primary => PendingDecision::primary(&snap, Category::LevelHold, Utc::now()),
            DecisionKind::Chase => PendingDecision::chase(&snap, Some("1-1".into()), Utc::now()),
        }
    }

    pub async fn merge_never_erases_flags(store: &dyn DecisionStore) {
        let now = Utc::now();
        assert!(store.get_state(1).await.unwrap().is_none());

        store.merge_state(1, &MatchStatePatch::creation(now)).await.unwrap();
        store
            .merge_state(
                1,
                &MatchStatePatch {
                    checkpoint1_evaluated: Some(true),
                    checkpoint1_score: Some("1-1".into()),
                    checkpoint1_category: Some(Category::LevelHold),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .merge_state(
                1,
                &MatchStatePatch {
                    checkpoint1_outcome_known: Some(true),
                    checkpoint1_won: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let state = store.get_state(1).await.unwrap().unwrap();
        assert!(state.checkpoint1_evaluated);
        assert_eq!(state.checkpoint1_score.as_deref(), Some("1-1"));
        assert_eq!(state.checkpoint1_category, Some(Category::LevelHold));
        assert!(state.checkpoint1_outcome_known);
        assert_eq!(state.checkpoint1_won, Some(false));
        assert!(!state.checkpoint2_evaluated);
        assert!(state.checkpoint2_score.is_none());
    }

    pub async fn put_pending_requires_state(store: &dyn DecisionStore) {
        let result = store.put_pending(&decision(2, DecisionKind::Primary)).await;
        assert!(matches!(result, Err(StoreError::MissingState(2))));
        assert!(store.list_pending(None).await.unwrap().is_empty());
    }

    pub async fn one_open_decision_per_kind(store: &dyn DecisionStore) {
        store.merge_state(3, &MatchStatePatch::creation(Utc::now())).await.unwrap();
        store.put_pending(&decision(3, DecisionKind::Primary)).await.unwrap();
        store.put_pending(&decision(3, DecisionKind::Primary)).await.unwrap();
        store.put_pending(&decision(3, DecisionKind::Chase)).await.unwrap();

        assert_eq!(store.list_pending(None).await.unwrap().len(), 2);
        assert_eq!(store.list_pending(Some(DecisionKind::Primary)).await.unwrap().len(), 1);
        assert_eq!(store.list_pending(Some(DecisionKind::Chase)).await.unwrap().len(), 1);

        let chase = store.get_pending(3, DecisionKind::Chase).await.unwrap().unwrap();
        assert_eq!(chase.checkpoint2_score.as_deref(), Some("1-1"));
    }

    pub async fn place_decision_writes_state_and_pending(store: &dyn DecisionStore) {
        let now = Utc::now();
        let pending = decision(6, DecisionKind::Primary);
        let patch = MatchStatePatch {
            checkpoint1_evaluated: Some(true),
            checkpoint1_score: Some("1-1".into()),
            checkpoint1_category: Some(Category::LevelHold),
            ..MatchStatePatch::creation(now)
        };
        store.place_decision(6, &patch, &pending).await.unwrap();

        let state = store.get_state(6).await.unwrap().unwrap();
        assert!(state.checkpoint1_evaluated);
        assert_eq!(state.checkpoint1_score.as_deref(), Some("1-1"));
        assert_eq!(store.get_pending(6, DecisionKind::Primary).await.unwrap(), Some(pending.clone()));

        // Replaying the same placement is a no-op.
        store.place_decision(6, &patch, &pending).await.unwrap();
        assert_eq!(store.list_pending(None).await.unwrap().len(), 1);
    }

    pub async fn archive_exactly_once(store: &dyn DecisionStore) {
        store.merge_state(4, &MatchStatePatch::creation(Utc::now())).await.unwrap();
        let pending = decision(4, DecisionKind::Primary);
        store.put_pending(&pending).await.unwrap();

        let first = store
            .move_to_archived(4, DecisionKind::Primary, Outcome::Win, Utc::now())
            .await
            .unwrap();
        match first {
            ArchiveResult::Archived(a) => {
                assert_eq!(a.outcome, Outcome::Win);
                assert_eq!(a.decision, pending);
            }
            ArchiveResult::NotPending => panic!("expected archive"),
        }

        let second = store
            .move_to_archived(4, DecisionKind::Primary, Outcome::Loss, Utc::now())
            .await
            .unwrap();
        assert_eq!(second, ArchiveResult::NotPending);

        assert!(store.get_pending(4, DecisionKind::Primary).await.unwrap().is_none());
        let archived = store.archived_for(4).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].outcome, Outcome::Win);
    }

    pub async fn unknown_category_survives_roundtrip(store: &dyn DecisionStore) {
        store.merge_state(5, &MatchStatePatch::creation(Utc::now())).await.unwrap();
        let mut pending = decision(5, DecisionKind::Primary);
        pending.category = Some("over_9_5".into());
        store.put_pending(&pending).await.unwrap();

        let loaded = store.get_pending(5, DecisionKind::Primary).await.unwrap().unwrap();
        assert_eq!(loaded.category.as_deref(), Some("over_9_5"));
    }
}
