//! Integration tests for gemwatch
//!
//! These tests drive a real engine through the probe feed and verify what
//! comes out the other side: statuses, responses, and stored history.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli_roundtrip;
pub mod control_surface;
pub mod engine_flows;
