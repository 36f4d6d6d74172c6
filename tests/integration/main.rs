//! Integration tests: full poll cycles against in-memory fakes and SQLite.

mod lifecycle_flow;
mod support;
