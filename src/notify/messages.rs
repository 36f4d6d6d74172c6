//! Notification texts for each lifecycle milestone.

use crate::types::{DecisionKind, Outcome, PendingDecision, Score};

fn outcome_word(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Win => "WON",
        Outcome::Loss => "LOST",
        Outcome::Error => "ERROR",
    }
}

fn kind_label(kind: DecisionKind) -> &'static str {
    match kind {
        DecisionKind::Primary => "Checkpoint-1 bet",
        DecisionKind::Chase => "Chase bet",
    }
}

/// A decision was just opened.
pub fn decision_placed(decision: &PendingDecision, minute: Option<u32>) -> String {
    let minute = minute.map_or_else(|| "?".to_string(), |m| m.to_string());
    match decision.kind {
        DecisionKind::Primary => format!(
            "{minute}' - {}\nLeague: {}\nScore: {}\nBet placed: {}",
            decision.match_name,
            decision.league_name,
            decision.checkpoint1_score.as_deref().unwrap_or("?"),
            decision.category.as_deref().unwrap_or("?"),
        ),
        DecisionKind::Chase => format!(
            "{minute}' - {}\nLeague: {}\nScore: {}\nChase bet placed",
            decision.match_name,
            decision.league_name,
            decision.checkpoint2_score.as_deref().unwrap_or("?"),
        ),
    }
}

/// The primary decision was settled by the half-time tally.
pub fn half_time_result(decision: &PendingDecision, half_time: &Score, outcome: Outcome) -> String {
    format!(
        "HT Result: {}\nScore at checkpoint: {}\nHalf-time: {half_time}\n{} {}",
        decision.match_name,
        decision.checkpoint1_score.as_deref().unwrap_or("?"),
        kind_label(decision.kind),
        outcome_word(outcome),
    )
}

/// A decision was settled by the final result.
pub fn full_time_result(decision: &PendingDecision, final_score: &Score, outcome: Outcome) -> String {
    format!(
        "FT Result: {}\nScore: {final_score}\n{} {}",
        decision.match_name,
        kind_label(decision.kind),
        outcome_word(outcome),
    )
}

/// A decision could not be reconciled and was archived as an error.
pub fn resolution_error(decision: &PendingDecision, reason: &str) -> String {
    format!(
        "Resolution error: {} (fixture {})\n{} archived as ERROR: {reason}",
        decision.match_name,
        decision.fixture_id,
        kind_label(decision.kind),
    )
}

/// Operator alert after repeated failed polls.
pub fn operator_alert(agent: &str, consecutive_failures: u32, last_error: &str) -> String {
    format!("[{agent}] {consecutive_failures} consecutive feed failures. Last error: {last_error}")
}
