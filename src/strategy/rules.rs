//! Resolution rules per decision category.
//!
//! Every win/loss rule lives here so the state machine (half-time) and
//! the resolver (full-time) share one definition.

use crate::types::{Category, Outcome, Score};

/// Over line for `GoallessBreak`: the match must finish with more goals than this.
pub const GOALLESS_OVER_LINE: u32 = 1;

/// Half-time stability rule: WIN iff the half-time tally equals the
/// checkpoint-1 tally exactly.
pub fn half_time_outcome(checkpoint1_score: &str, half_time: &Score) -> Outcome {
    Outcome::from_won(half_time.to_string() == checkpoint1_score)
}

/// Full-time rule for a primary decision.
///
/// `half_time` is only consulted for `LevelHold`, which normally resolves at
/// half-time but is reconciled here when the half-time poll was missed.
/// Returns `Outcome::Error` when the context needed by the rule is absent.
pub fn full_time_outcome(
    category: Category,
    checkpoint1_score: Option<&str>,
    final_score: &Score,
    half_time: Option<&Score>,
) -> Outcome {
    match category {
        Category::NarrowLead => Outcome::from_won(!final_score.is_draw()),
        Category::GoallessBreak => Outcome::from_won(final_score.total() > GOALLESS_OVER_LINE),
        Category::LevelHold => match (checkpoint1_score, half_time) {
            (Some(cp1), Some(ht)) => half_time_outcome(cp1, ht),
            _ => Outcome::Error,
        },
    }
}

/// Chase rule: the chase WINS iff the final tally differs from the tally
/// captured at checkpoint 2 (a goal arrived after the chase point).
pub fn chase_outcome(checkpoint2_score: &str, final_score: &Score) -> Outcome {
    Outcome::from_won(final_score.to_string() != checkpoint2_score)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
