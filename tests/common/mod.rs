//! Shared test utilities for gemwatch
//!
//! This module provides common helpers for integration tests:
//! - Canned probe traffic following the production URL grammar
//! - A harness that runs a real tracker engine against an in-memory feed

pub mod harness;
