//! # RTS AI Test Utilities
//!
//! Shared testing utilities for the AI crates:
//! - Scripted world, dock and pathfinder mocks
//! - A manual frame clock and a rig bundling every collaborator
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod mocks;

/// Re-export proptest for convenience.
pub use proptest;
