//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley platform:
//! Session, Message, context window entries, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod context;
pub mod error;
pub mod message;
pub mod session;
