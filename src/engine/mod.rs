//! Core engine: lifecycle state machine, tracker, resolver and the poll cycle.

pub mod lifecycle;
pub mod tracker;
pub mod resolver;
pub mod cycle;
