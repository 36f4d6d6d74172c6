//! One poll cycle: live fixtures through the tracker, then the resolver.
//!
//! Failed live polls are counted; when the count reaches the configured
//! threshold a single operator alert goes out. The counter resets on the
//! next successful poll.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::engine::resolver::{ResolutionReport, Resolver};
use crate::engine::tracker::{MatchTracker, TrackOutcome};
use crate::feed::ScoreFeed;
use crate::notify::{messages, send_best_effort, Notifier};
use crate::types::DecisionKind;

/// Summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_number: u64,
    /// `false` when the live poll failed.
    pub feed_ok: bool,
    pub fixtures_seen: usize,
    pub primaries_placed: usize,
    pub chases_placed: usize,
    pub half_time_resolutions: usize,
    /// Fixtures abandoned this cycle after a storage error.
    pub fixture_errors: usize,
    /// `None` when the pending decisions could not be listed.
    pub resolution: Option<ResolutionReport>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CycleReport {
    pub fn decisions_placed(&self) -> usize {
        self.primaries_placed + self.chases_placed
    }
}

pub struct CycleRunner {
    feed: Arc<dyn ScoreFeed>,
    notifier: Arc<dyn Notifier>,
    tracker: MatchTracker,
    resolver: Resolver,
    agent_name: String,
    failure_alert_threshold: u32,
    consecutive_failures: u32,
    cycle_count: u64,
}

impl CycleRunner {
    pub fn new(
        feed: Arc<dyn ScoreFeed>,
        notifier: Arc<dyn Notifier>,
        tracker: MatchTracker,
        resolver: Resolver,
        agent_name: impl Into<String>,
        failure_alert_threshold: u32,
    ) -> Self {
        Self {
            feed,
            notifier,
            tracker,
            resolver,
            agent_name: agent_name.into(),
            failure_alert_threshold: failure_alert_threshold.max(1),
            consecutive_failures: 0,
            cycle_count: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run a full cycle. Never fails: every error is logged and counted.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.cycle_count += 1;
        let mut report = CycleReport {
            cycle_number: self.cycle_count,
            timestamp: Some(now),
            ..Default::default()
        };
        info!(cycle = self.cycle_count, "Starting cycle");

        match self.feed.fetch_live().await {
            Ok(snapshots) => {
                self.consecutive_failures = 0;
                report.feed_ok = true;
                report.fixtures_seen = snapshots.len();

                for snapshot in &snapshots {
                    match self.tracker.process(snapshot, now).await {
                        Ok(TrackOutcome::Placed(DecisionKind::Primary)) => report.primaries_placed += 1,
                        Ok(TrackOutcome::Placed(DecisionKind::Chase)) => report.chases_placed += 1,
                        Ok(TrackOutcome::ResolvedAtHalfTime(_)) => report.half_time_resolutions += 1,
                        Ok(TrackOutcome::StateUpdated | TrackOutcome::Unchanged) => {}
                        Err(e) => {
                            report.fixture_errors += 1;
                            error!(
                                fixture_id = snapshot.fixture_id,
                                error = %e,
                                "Fixture abandoned for this cycle"
                            );
                        }
                    }
                }
            }
            Err(e) => self.record_feed_failure(&e.to_string()).await,
        }

        match self.resolver.resolve_all(now).await {
            Ok(resolution) => report.resolution = Some(resolution),
            Err(e) => error!(error = %e, "Resolution pass failed"),
        }

        log_cycle_report(&report);
        report
    }

    async fn record_feed_failure(&mut self, last_error: &str) {
        self.consecutive_failures += 1;
        warn!(
            feed = self.feed.name(),
            consecutive = self.consecutive_failures,
            error = last_error,
            "Live poll failed"
        );

        if self.consecutive_failures == self.failure_alert_threshold {
            let text =
                messages::operator_alert(&self.agent_name, self.consecutive_failures, last_error);
            send_best_effort(self.notifier.as_ref(), &text).await;
        }
    }
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    let resolution = report.resolution.clone().unwrap_or_default();
    info!(
        cycle = report.cycle_number,
        feed_ok = report.feed_ok,
        fixtures = report.fixtures_seen,
        placed = report.decisions_placed(),
        half_time = report.half_time_resolutions,
        archived = resolution.archived,
        resolution_errors = resolution.errors,
        fixture_errors = report.fixture_errors,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
