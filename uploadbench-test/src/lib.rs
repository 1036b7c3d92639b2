//! Test utilities for the upload benchmark.
//!
//! This crate provides utilities to run the benchmark against a realistic storage service in
//! integration tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
