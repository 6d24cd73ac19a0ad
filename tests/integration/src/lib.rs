//! Integration test utilities for the gateway client
//!
//! Fake collaborators for driving the connector without a network, plus
//! fixtures for building configurations and wire frames.


pub use fixtures::*;
pub use helpers::*;
