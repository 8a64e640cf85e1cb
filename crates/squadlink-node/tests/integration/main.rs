//! Integration test entry point for squadlink-node.
//!
//! Run with: cargo test --test integration

mod harness;
mod relay;
mod squads;
