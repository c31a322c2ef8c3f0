//! Observability setup for Parley.
//!
//! Tracing subscriber initialization shared by the CLI and the server.

pub mod tracing_setup;
