//! Testing utilities and mock implementations
//!
//! This module provides a recording fake broker for exercising
//! provisioning and consumer construction without a live namespace.

pub mod mocks;

pub use mocks::*;
