//! The engine behind `boltbench`: drives a primary object store (Google Cloud Storage) and an
//! accelerator endpoint (Bolt) through identical workloads and compares them.
//!
//! The crate is split into the storage layer and the engine built on top of it:
//!
//! - [`backend`] provides the [`Backend`] trait with a GCS implementation and an in-memory one,
//!   and [`Backends`], the pair of endpoints under comparison.
//! - [`stats`] turns raw samples into mean/p50/p90 summaries.
//! - [`keys`] produces the object names a workload operates on, and random upload payloads.
//! - [`runner`] executes list/upload/download/delete workloads against both endpoints.
//! - [`report`] merges per-phase results into a single [`PerfReport`].
//! - [`validation`] compares content digests of one object across both endpoints.
//! - [`convergence`] polls an endpoint until a missing object becomes readable.
//!
//! It is designed as a library crate to be used by the `server`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod convergence;
pub mod error;
pub mod keys;
pub mod report;
pub mod runner;
pub mod stats;
pub mod validation;

mod encoding;
#[cfg(test)]
mod testutil;

pub use backend::{Backend, BackendKind, Backends, BoxedBackend};
pub use convergence::{RetryMode, RetryPolicy};
pub use error::{EngineError, EngineResult};
pub use report::PerfReport;
pub use runner::{DownloadMode, PerfRunner, PhaseSamples};
pub use validation::ValidationResult;
