//! Integration test utilities for the realtime client
//!
//! This crate provides scripted transports, recording collaborators and
//! Pusher frame fixtures for end-to-end session tests.

pub mod helpers;
pub mod fixtures;

pub use helpers::*;
pub use fixtures::*;
