//! Shared test utilities for gfxreplay
//!
//! This module provides common helpers for integration tests:
//! - Capture fixtures (atom streams with and without GL state)
//! - Server state backed by temporary directories

pub mod fixtures;
