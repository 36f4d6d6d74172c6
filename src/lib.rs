//! MATCHDAY: live-fixture checkpoint tracker and simulated bet reconciler.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod feed;
pub mod storage;
pub mod notify;
pub mod strategy;
pub mod engine;
