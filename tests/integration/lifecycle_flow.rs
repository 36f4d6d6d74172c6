//! End-to-end cycles over scripted fixtures.
//!
//! Each test drives `CycleRunner` with explicit timestamps so the
//! resolution grace period is deterministic.

use chrono::{Duration, Utc};
use std::sync::Arc;

use matchday::feed::FeedError;
use matchday::storage::{DecisionStore, MemoryStore, SqliteStore};
use matchday::types::*;

use crate::support::{fixture, runner, FlakyStore, MockFeed, RecordingNotifier};

#[tokio::test]
async fn test_full_lifecycle_with_chase() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    // Two fixtures that both lose the primary at half-time.
    let script = [
        (0, vec![fixture(1, "1H", Some(20), 1, 1), fixture(2, "1H", Some(20), 0, 0)]),
        (16, vec![fixture(1, "1H", Some(36), 1, 1), fixture(2, "1H", Some(36), 1, 1)]),
        (18, vec![fixture(1, "1H", Some(37), 1, 1), fixture(2, "1H", Some(37), 1, 1)]),
        (27, vec![fixture(1, "HT", Some(45), 2, 1), fixture(2, "HT", Some(45), 1, 2)]),
        (75, vec![fixture(1, "2H", Some(80), 2, 1), fixture(2, "2H", Some(79), 1, 2)]),
        (77, vec![fixture(1, "2H", Some(81), 2, 1), fixture(2, "2H", Some(81), 1, 2)]),
        (105, vec![fixture(1, "FT", Some(90), 2, 2), fixture(2, "FT", Some(90), 1, 2)]),
    ];

    for (offset, snapshots) in script {
        feed.set_live(snapshots);
        let report = r.run_cycle(t0 + Duration::minutes(offset)).await;
        assert!(report.feed_ok);
        assert_eq!(report.fixture_errors, 0);
    }

    // Goal after the chase point: chase wins.
    let one = store.archived_for(1).await.unwrap();
    assert_eq!(one.len(), 2);
    let outcome = |kind| one.iter().find(|a| a.decision.kind == kind).map(|a| a.outcome);
    assert_eq!(outcome(DecisionKind::Primary), Some(Outcome::Loss));
    assert_eq!(outcome(DecisionKind::Chase), Some(Outcome::Win));

    // Tally unchanged since the chase point: chase loses.
    let two = store.archived_for(2).await.unwrap();
    let chase = two.iter().find(|a| a.decision.kind == DecisionKind::Chase).unwrap();
    assert_eq!(chase.outcome, Outcome::Loss);
    assert_eq!(chase.decision.checkpoint2_score.as_deref(), Some("1-2"));

    assert!(store.list_pending(None).await.unwrap().is_empty());
    assert_eq!(notifier.count_containing("Bet placed: level_hold"), 2);
    assert_eq!(notifier.count_containing("Checkpoint-1 bet LOST"), 2);
    assert_eq!(notifier.count_containing("Chase bet placed"), 2);
    assert_eq!(notifier.count_containing("FT Result"), 2);
}

#[tokio::test]
async fn test_won_primary_closes_the_fixture() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    feed.set_live(vec![fixture(3, "1H", Some(36), 2, 2)]);
    r.run_cycle(t0).await;
    feed.set_live(vec![fixture(3, "HT", Some(45), 2, 2)]);
    r.run_cycle(t0 + Duration::minutes(12)).await;
    feed.set_live(vec![fixture(3, "2H", Some(80), 3, 2)]);
    r.run_cycle(t0 + Duration::minutes(60)).await;

    let state = store.get_state(3).await.unwrap().unwrap();
    assert_eq!(state.stage(), MatchStage::Checkpoint1Won);
    assert!(store.list_pending(None).await.unwrap().is_empty());
    assert_eq!(notifier.count_containing("Chase bet placed"), 0);
}

#[tokio::test]
async fn test_restart_replays_without_duplicates() {
    let path = std::env::temp_dir().join(format!("matchday-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());
    let feed = Arc::new(MockFeed::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let t0 = Utc::now();

    feed.set_live(vec![fixture(10, "1H", Some(36), 1, 0)]);
    {
        let store: Arc<dyn DecisionStore> = Arc::new(SqliteStore::connect(&url).await.unwrap());
        let mut r = runner(feed.clone(), store, notifier.clone());
        let report = r.run_cycle(t0).await;
        assert_eq!(report.primaries_placed, 1);
    }

    // New process, same database, same snapshot.
    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let report = r.run_cycle(t0 + Duration::minutes(1)).await;
    assert_eq!(report.decisions_placed(), 0);
    assert_eq!(store.list_pending(None).await.unwrap().len(), 1);
    assert_eq!(notifier.count_containing("Bet placed"), 1);

    feed.set_live(vec![fixture(10, "FT", Some(90), 2, 0)]);
    let report = r.run_cycle(t0 + Duration::minutes(70)).await;
    assert_eq!(report.resolution.map(|res| res.wins), Some(1));
    assert_eq!(store.archived_for(10).await.unwrap()[0].outcome, Outcome::Win);

    drop(r);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_crash_between_notify_and_archive_archives_once() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(FlakyStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    feed.set_live(vec![fixture(20, "1H", Some(36), 0, 1)]);
    r.run_cycle(t0).await;

    feed.set_live(vec![fixture(20, "FT", Some(90), 0, 1)]);
    store.fail_archive(true);
    let report = r.run_cycle(t0 + Duration::minutes(70)).await;
    let resolution = report.resolution.unwrap();
    assert_eq!(resolution.store_failures, 1);
    assert_eq!(resolution.archived, 0);
    assert_eq!(store.list_pending(None).await.unwrap().len(), 1);

    store.fail_archive(false);
    r.run_cycle(t0 + Duration::minutes(72)).await;
    r.run_cycle(t0 + Duration::minutes(74)).await;

    let archived = store.archived_for(20).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].outcome, Outcome::Win);
    assert!(store.list_pending(None).await.unwrap().is_empty());
    // The message may repeat; the archive may not.
    assert_eq!(notifier.count_containing("FT Result"), 2);
}

#[tokio::test]
async fn test_crash_during_placement_retries_next_poll() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(FlakyStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    feed.set_live(vec![fixture(30, "1H", Some(30), 1, 1)]);
    r.run_cycle(t0).await;

    // Placement write fails: neither the decision nor the flags land.
    store.fail_merge(true);
    feed.set_live(vec![fixture(30, "1H", Some(35), 1, 1)]);
    let report = r.run_cycle(t0 + Duration::minutes(5)).await;
    assert_eq!(report.fixture_errors, 1);
    assert_eq!(notifier.count_containing("Bet placed"), 0);

    store.fail_merge(false);
    feed.set_live(vec![fixture(30, "1H", Some(36), 1, 1)]);
    let report = r.run_cycle(t0 + Duration::minutes(6)).await;
    assert_eq!(report.primaries_placed, 1);

    assert_eq!(store.list_pending(None).await.unwrap().len(), 1);
    assert!(store.get_state(30).await.unwrap().unwrap().checkpoint1_evaluated);
    assert_eq!(notifier.count_containing("Bet placed"), 1);
}

#[tokio::test]
async fn test_failed_placement_leaves_no_orphan_decision() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(FlakyStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    feed.set_live(vec![fixture(31, "1H", Some(20), 1, 1)]);
    r.run_cycle(t0).await;

    // The only poll inside the checkpoint-1 window fails to write.
    store.fail_merge(true);
    feed.set_live(vec![fixture(31, "1H", Some(36), 1, 1)]);
    let report = r.run_cycle(t0 + Duration::minutes(16)).await;
    assert_eq!(report.fixture_errors, 1);
    store.fail_merge(false);

    let script = [
        (18, fixture(31, "1H", Some(38), 1, 1)),
        (27, fixture(31, "HT", Some(45), 2, 1)),
        (75, fixture(31, "2H", Some(80), 2, 1)),
    ];
    let mut half_time_resolutions = 0;
    let mut chases = 0;
    for (offset, snapshot) in script {
        feed.set_live(vec![snapshot]);
        let report = r.run_cycle(t0 + Duration::minutes(offset)).await;
        assert_eq!(report.fixture_errors, 0);
        half_time_resolutions += report.half_time_resolutions;
        chases += report.chases_placed;
    }

    // The state and the ledger agree: no open decision, window not back-filled.
    assert!(store.list_pending(None).await.unwrap().is_empty());
    let state = store.get_state(31).await.unwrap().unwrap();
    assert!(!state.checkpoint1_evaluated);
    assert_eq!(state.stage(), MatchStage::Checkpoint1Pending);
    assert_eq!(half_time_resolutions, 0);
    assert_eq!(chases, 0);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_unknown_category_archived_as_error() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    store.merge_state(40, &MatchStatePatch::creation(t0)).await.unwrap();
    store
        .put_pending(&PendingDecision {
            fixture_id: 40,
            kind: DecisionKind::Primary,
            category: Some("corner_count".into()),
            match_name: "Feyenoord vs Utrecht".into(),
            league_name: "Eredivisie".into(),
            league_id: 88,
            checkpoint1_score: Some("1-0".into()),
            checkpoint2_score: None,
            placed_at: t0,
        })
        .await
        .unwrap();

    feed.set_live(vec![fixture(40, "FT", Some(90), 1, 0)]);
    let report = r.run_cycle(t0 + Duration::minutes(90)).await;

    assert_eq!(report.resolution.map(|res| res.errors), Some(1));
    assert_eq!(store.archived_for(40).await.unwrap()[0].outcome, Outcome::Error);
    assert_eq!(notifier.count_containing("Resolution error"), 1);
}

#[tokio::test]
async fn test_feed_outage_alerts_once_and_recovers() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    feed.set_error(FeedError::Http { status: 502, body: "bad gateway".into() });
    for i in 0..4 {
        let report = r.run_cycle(t0 + Duration::minutes(i)).await;
        assert!(!report.feed_ok);
    }
    assert_eq!(notifier.count_containing("consecutive feed failures"), 1);

    feed.clear_error();
    feed.set_live(vec![fixture(50, "1H", Some(36), 0, 0)]);
    let report = r.run_cycle(t0 + Duration::minutes(5)).await;
    assert!(report.feed_ok);
    assert_eq!(report.primaries_placed, 1);
    assert_eq!(r.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_notifier_outage_never_blocks_progress() {
    let feed = Arc::new(MockFeed::default());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    notifier.set_failing(true);
    let mut r = runner(feed.clone(), store.clone(), notifier.clone());
    let t0 = Utc::now();

    feed.set_live(vec![fixture(60, "1H", Some(36), 0, 0)]);
    r.run_cycle(t0).await;
    feed.set_live(vec![fixture(60, "FT", Some(90), 1, 1)]);
    r.run_cycle(t0 + Duration::minutes(60)).await;

    assert!(notifier.messages().is_empty());
    assert_eq!(store.archived_for(60).await.unwrap()[0].outcome, Outcome::Win);
}
