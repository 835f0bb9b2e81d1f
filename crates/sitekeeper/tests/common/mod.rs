//! Shared test utilities for sitekeeper integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temporary site
//! - Builders for backup options and seeded tables

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
