//! Integration test crate for the Vouch escrow engine.
//!
//! This crate exists solely to run integration tests that span multiple Vouch crates.
//! It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
