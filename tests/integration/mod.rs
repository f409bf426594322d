//! Integration tests for gfxreplay
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod pipeline_pass;
pub mod replay_manager;
pub mod rpc_router;
