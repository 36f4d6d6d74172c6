//! Deterministic fakes for integration testing.
//!
//! `MockFeed` serves scripted snapshots, `RecordingNotifier` keeps every
//! message, and `FlakyStore` wraps a `MemoryStore` with switches that make
//! selected writes fail, simulating a crash between two steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use matchday::engine::cycle::CycleRunner;
use matchday::engine::lifecycle::LifecycleWindows;
use matchday::engine::resolver::Resolver;
use matchday::engine::tracker::MatchTracker;
use matchday::feed::{FeedError, ScoreFeed};
use matchday::notify::{Notifier, NotifyError};
use matchday::storage::{ArchiveResult, DecisionStore, MemoryStore, StoreError};
use matchday::types::*;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

pub fn fixture(id: FixtureId, code: &str, minute: Option<u32>, home: u32, away: u32) -> FixtureSnapshot {
    FixtureSnapshot {
        fixture_id: id,
        minute,
        phase: MatchPhase::from_status_code(code),
        status_code: code.to_string(),
        home_team: "Feyenoord".to_string(),
        away_team: "Utrecht".to_string(),
        league_name: "Eredivisie".to_string(),
        league_id: 88,
        goals: Score::new(home, away),
        halftime: None,
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockFeed {
    live: Mutex<Vec<FixtureSnapshot>>,
    latest: Mutex<HashMap<FixtureId, FixtureSnapshot>>,
    /// If set, every call returns this error.
    force_error: Mutex<Option<FeedError>>,
}

impl MockFeed {
    /// Replace the live list; every snapshot also becomes the latest known
    /// state of its fixture for id lookups.
    pub fn set_live(&self, snapshots: Vec<FixtureSnapshot>) {
        let mut latest = self.latest.lock().unwrap();
        for s in &snapshots {
            latest.insert(s.fixture_id, s.clone());
        }
        *self.live.lock().unwrap() = snapshots;
    }

    pub fn set_error(&self, error: FeedError) {
        *self.force_error.lock().unwrap() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl ScoreFeed for MockFeed {
    async fn fetch_live(&self) -> Result<Vec<FixtureSnapshot>, FeedError> {
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !s.phase.is_finished())
            .cloned()
            .collect())
    }

    async fn fetch_by_ids(
        &self,
        ids: &[FixtureId],
    ) -> Result<HashMap<FixtureId, FixtureSnapshot>, FeedError> {
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        let latest = self.latest.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| latest.get(id).map(|s| (*id, s.clone())))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("telegram unreachable".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// `MemoryStore` whose archive and state writes can be made to fail.
/// `fail_merge` covers both `merge_state` and `place_decision`.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_archive: AtomicBool,
    fail_merge: AtomicBool,
}

impl FlakyStore {
    pub fn fail_archive(&self, fail: bool) {
        self.fail_archive.store(fail, Ordering::SeqCst);
    }

    pub fn fail_merge(&self, fail: bool) {
        self.fail_merge.store(fail, Ordering::SeqCst);
    }

    fn crash() -> StoreError {
        StoreError::Unavailable("simulated crash".into())
    }
}

#[async_trait]
impl DecisionStore for FlakyStore {
    async fn get_state(&self, fixture_id: FixtureId) -> Result<Option<MatchState>, StoreError> {
        self.inner.get_state(fixture_id).await
    }

    async fn merge_state(&self, fixture_id: FixtureId, patch: &MatchStatePatch) -> Result<(), StoreError> {
        if self.fail_merge.load(Ordering::SeqCst) {
            return Err(Self::crash());
        }
        self.inner.merge_state(fixture_id, patch).await
    }

    async fn list_pending(&self, kind: Option<DecisionKind>) -> Result<Vec<PendingDecision>, StoreError> {
        self.inner.list_pending(kind).await
    }

    async fn get_pending(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
    ) -> Result<Option<PendingDecision>, StoreError> {
        self.inner.get_pending(fixture_id, kind).await
    }

    async fn put_pending(&self, decision: &PendingDecision) -> Result<(), StoreError> {
        self.inner.put_pending(decision).await
    }

    async fn place_decision(
        &self,
        fixture_id: FixtureId,
        patch: &MatchStatePatch,
        decision: &PendingDecision,
    ) -> Result<(), StoreError> {
        if self.fail_merge.load(Ordering::SeqCst) {
            return Err(Self::crash());
        }
        self.inner.place_decision(fixture_id, patch, decision).await
    }

    async fn move_to_archived(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
        outcome: Outcome,
        resolved_at: DateTime<Utc>,
    ) -> Result<ArchiveResult, StoreError> {
        if self.fail_archive.load(Ordering::SeqCst) {
            return Err(Self::crash());
        }
        self.inner.move_to_archived(fixture_id, kind, outcome, resolved_at).await
    }

    async fn archived_for(&self, fixture_id: FixtureId) -> Result<Vec<ArchivedDecision>, StoreError> {
        self.inner.archived_for(fixture_id).await
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Build a runner the way `main` does, over the given collaborators.
pub fn runner(
    feed: Arc<MockFeed>,
    store: Arc<dyn DecisionStore>,
    notifier: Arc<RecordingNotifier>,
) -> CycleRunner {
    let notifier: Arc<dyn Notifier> = notifier;
    let tracker = MatchTracker::new(store.clone(), notifier.clone(), LifecycleWindows::default());
    let resolver = Resolver::new(
        feed.clone(),
        store,
        notifier.clone(),
        20,
        chrono::Duration::minutes(15),
    );
    CycleRunner::new(feed, notifier, tracker, resolver, "MATCHDAY-TEST", 3)
}
