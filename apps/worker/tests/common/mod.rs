//! Common test utilities for worker integration tests
//!
//! This module provides shared test infrastructure for integration tests,
//! including job fixtures, a queue on a manual clock and scripted handlers.

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
