//! Context window assembly for downstream AI completion calls.
//!
//! `tokens` holds the CJK-aware estimation heuristic and truncation
//! helpers; `builder` assembles a token-budgeted, chronologically ordered
//! window over a session's history.

pub mod builder;
pub mod tokens;

pub use builder::{ContextBuilder, ContextParams};
