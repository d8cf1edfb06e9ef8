//! Integration test aggregator
//!
//! Entry point for the cross-crate tests. Individual test modules are
//! declared in `suite/mod.rs`.

mod common;
mod suite;
