//! Module implementing the boltbench webserver.
//!
//! The main server application is implemented in the [`App`] struct, which sets up routing and
//! middleware. It is a tower service that can be run using any compatible server framework.
//!
//! To listen to incoming connections, use the [`server()`] function, which opens a TCP listener and
//! serves the application.
//!
//! # Testing
//!
//! For end-to-end tests of the server, see the `boltbench-test` crate, which starts a test server
//! backed by in-memory storage.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
