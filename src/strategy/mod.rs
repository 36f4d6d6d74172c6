//! Betting strategy: checkpoint-1 classification and win/loss rules.
//!
//! Pure functions only. The lifecycle state machine decides *when* a
//! rule applies; this module decides *what* the answer is.

pub mod patterns;
pub mod rules;

pub use patterns::{classify, classify_tally};
pub use rules::{chase_outcome, full_time_outcome, half_time_outcome, GOALLESS_OVER_LINE};
