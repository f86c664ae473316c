//! The boltbench server.
//!
//! This exposes the benchmark and validation engine of [`boltbench_service`] as HTTP function
//! endpoints. Each endpoint takes a flat JSON request body, see [`request::BenchRequest`]:
//!
//! - `POST /ops`: a single storage operation against one endpoint
//! - `POST /validate`: compares the digests of one object on both endpoints
//! - `POST /perf`: latency and throughput benchmarks against both endpoints
//! - `POST /autoheal`: measures how long the accelerator takes to serve a missing object
//! - `GET /health`: liveness check
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod healthcheck;
pub mod observability;
pub mod region;
pub mod request;
pub mod state;
pub mod web;
