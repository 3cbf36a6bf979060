//! Common test utilities for hadley.
//!
//! This module provides shared fixtures and assertions for the integration tests.

pub mod assertions;
pub mod test_data;
