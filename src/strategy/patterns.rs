//! Checkpoint-1 tally classification.
//!
//! A fixed table maps accepted goal tallies to a decision category.
//! Anything not in the table is a terminal skip.

use crate::types::{Category, Score};

// ---------------------------------------------------------------------------
// Pattern table
// ---------------------------------------------------------------------------

struct TallyPattern {
    tallies: &'static [&'static str],
    category: Category,
}

const TALLY_PATTERNS: &[TallyPattern] = &[
    TallyPattern { tallies: &["1-1", "2-2", "3-3"], category: Category::LevelHold },
    TallyPattern { tallies: &["1-0", "0-1", "2-1", "1-2"], category: Category::NarrowLead },
    TallyPattern { tallies: &["0-0"], category: Category::GoallessBreak },
];

/// Classify a tally string. Comparison is exact.
pub fn classify_tally(tally: &str) -> Option<Category> {
    TALLY_PATTERNS
        .iter()
        .find(|p| p.tallies.contains(&tally))
        .map(|p| p.category)
}

/// Classify a score as observed at checkpoint 1.
pub fn classify(score: &Score) -> Option<Category> {
    classify_tally(&score.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
