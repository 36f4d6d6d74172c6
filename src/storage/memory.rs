//! In-process store.
//!
//! Same contract as `SqliteStore`, held behind one mutex so every
//! operation is trivially atomic. Nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::warn;

use super::{ArchiveResult, DecisionStore, StoreError};
use crate::types::{
    ArchivedDecision, DecisionKind, FixtureId, MatchState, MatchStatePatch, Outcome,
    PendingDecision,
};

#[derive(Default)]
struct Inner {
    states: HashMap<FixtureId, MatchState>,
    pending: BTreeMap<(FixtureId, DecisionKind), PendingDecision>,
    archived: Vec<ArchivedDecision>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn get_state(&self, fixture_id: FixtureId) -> Result<Option<MatchState>, StoreError> {
        Ok(self.lock()?.states.get(&fixture_id).cloned())
    }

    async fn merge_state(&self, fixture_id: FixtureId, patch: &MatchStatePatch) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let now = patch.last_update.unwrap_or_else(Utc::now);
        inner
            .states
            .entry(fixture_id)
            .or_insert_with(|| MatchState::fresh(now))
            .apply(patch);
        Ok(())
    }

    async fn list_pending(&self, kind: Option<DecisionKind>) -> Result<Vec<PendingDecision>, StoreError> {
        Ok(self
            .lock()?
            .pending
            .values()
            .filter(|d| kind.map_or(true, |k| d.kind == k))
            .cloned()
            .collect())
    }

    async fn get_pending(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
    ) -> Result<Option<PendingDecision>, StoreError> {
        Ok(self.lock()?.pending.get(&(fixture_id, kind)).cloned())
    }

    async fn put_pending(&self, decision: &PendingDecision) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.states.contains_key(&decision.fixture_id) {
            return Err(StoreError::MissingState(decision.fixture_id));
        }
        inner
            .pending
            .insert((decision.fixture_id, decision.kind), decision.clone());
        Ok(())
    }

    async fn place_decision(
        &self,
        fixture_id: FixtureId,
        patch: &MatchStatePatch,
        decision: &PendingDecision,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let now = patch.last_update.unwrap_or_else(Utc::now);
        inner
            .states
            .entry(fixture_id)
            .or_insert_with(|| MatchState::fresh(now))
            .apply(patch);
        inner
            .pending
            .insert((decision.fixture_id, decision.kind), decision.clone());
        Ok(())
    }

    async fn move_to_archived(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
        outcome: Outcome,
        resolved_at: DateTime<Utc>,
    ) -> Result<ArchiveResult, StoreError> {
        let mut inner = self.lock()?;
        let Some(decision) = inner.pending.remove(&(fixture_id, kind)) else {
            return Ok(ArchiveResult::NotPending);
        };

        let already = inner
            .archived
            .iter()
            .any(|a| a.decision.fixture_id == fixture_id && a.decision.kind == kind);
        if already {
            warn!(fixture_id, kind = %kind, "Decision already archived, dropping stale pending copy");
            return Ok(ArchiveResult::NotPending);
        }

        let archived = ArchivedDecision::new(decision, outcome, resolved_at);
        inner.archived.push(archived.clone());
        Ok(ArchiveResult::Archived(archived))
    }

    async fn archived_for(&self, fixture_id: FixtureId) -> Result<Vec<ArchivedDecision>, StoreError> {
        Ok(self
            .lock()?
            .archived
            .iter()
            .filter(|a| a.decision.fixture_id == fixture_id)
            .cloned()
            .collect())
    }
}
