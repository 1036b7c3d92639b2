//! Concurrent upload benchmark for object storage.
//!
//! A run spawns a fixed number of workers that each upload one object of the same random payload
//! into a freshly created container. Workers are held back by a [release gate](release) until all
//! of them are spawned, so their uploads start together. The outcome of every upload is collected
//! by the [`ResultAggregator`](aggregator::ResultAggregator), and the orchestrator in [`benchmark`]
//! waits for all workers through the [`CompletionTracker`](completion::CompletionTracker) before
//! it reports and deletes the container again.

pub mod aggregator;
pub mod benchmark;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod names;
pub mod observability;
pub mod payload;
pub mod release;
mod report;
pub mod worker;

pub use benchmark::{BenchmarkReport, BenchmarkSettings, Cleanup};
pub use error::{BenchmarkError, Result};
