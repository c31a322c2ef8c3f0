//! Business logic and repository trait definitions for Parley.
//!
//! This crate defines the "ports" (repository traits) that the
//! infrastructure layer implements, and the services built on them:
//! session lifecycle, the message append pipeline, the context window
//! builder, and the real-time connection registry. It depends only on
//! `parley-types` -- never on `parley-infra` or any database/IO crate.

pub mod context;
pub mod message;
pub mod realtime;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
