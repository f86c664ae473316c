//! Test utilities for boltbench.
//!
//! This crate provides utilities to facilitate integration testing of the boltbench server. See
//! the modules for all available utilities.

pub mod server;
pub mod tracing;
