//! Session domain types for Parley.
//!
//! A session is a bounded conversation between an end user and the support
//! organization. Every session belongs to exactly one tenant and moves
//! through an explicit status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::ConversationError;

/// Default priority assigned to newly created sessions.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Lifecycle status of a support session.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('waiting', 'active', 'transferred', 'closed', 'timeout'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, not yet assigned to a staff member.
    Waiting,
    /// A staff member is handling the conversation.
    Active,
    /// Handed off to another staff member, awaiting pickup.
    Transferred,
    /// Closed by a staff member or the user. Terminal.
    Closed,
    /// Closed by the external expiry job. Terminal, never a valid
    /// target of a status-update request.
    Timeout,
}

impl SessionStatus {
    /// Whether the session still accepts messages and reuse.
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Waiting | SessionStatus::Active)
    }

    /// Whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Timeout)
    }

    /// Whether `self -> to` is an allowed transition of the public API.
    ///
    /// Transition table:
    ///
    /// | From        | Allowed to          |
    /// |-------------|---------------------|
    /// | Waiting     | Active, Closed      |
    /// | Active      | Closed, Transferred |
    /// | Transferred | Active, Closed      |
    /// | Closed      | (none)              |
    /// | Timeout     | (none)              |
    ///
    /// Timeout is reached only through the expiry hook, never through
    /// a status-update request, so it is not a valid target here.
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Waiting, Active)
                | (Waiting, Closed)
                | (Active, Closed)
                | (Active, Transferred)
                | (Transferred, Active)
                | (Transferred, Closed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Transferred => write!(f, "transferred"),
            SessionStatus::Closed => write!(f, "closed"),
            SessionStatus::Timeout => write!(f, "timeout"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(SessionStatus::Waiting),
            "active" => Ok(SessionStatus::Active),
            "transferred" => Ok(SessionStatus::Transferred),
            "closed" => Ok(SessionStatus::Closed),
            "timeout" => Ok(SessionStatus::Timeout),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Waiting
    }
}

/// Schemaless extension point carried by sessions.
///
/// An explicit key-value map with typed accessors -- platform-specific
/// data (customer name, tags, status-change reasons) lands here without
/// widening the session schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraData(serde_json::Map<String, Value>);

impl ExtraData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key, or `None` when absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a key, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge another map into this one. Keys in `other` win.
    pub fn merge(&mut self, other: ExtraData) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A support session between an end user and the support organization.
///
/// Reads and writes are always scoped by `(id, tenant_id)`; a lookup with
/// the wrong tenant behaves exactly like a lookup of a nonexistent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Platform-qualified user identifier, e.g. `"webchat:alice"`.
    pub user_id: String,
    /// Source platform of the conversation (webchat, telegram, ...).
    pub platform: String,
    pub status: SessionStatus,
    pub assigned_staff_id: Option<Uuid>,
    /// Dispatch priority, 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub extra_data: ExtraData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Build a new WAITING session for a user on a platform.
    pub fn new(tenant_id: Uuid, user_id: impl Into<String>, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            user_id: user_id.into(),
            platform: platform.into(),
            status: SessionStatus::Waiting,
            assigned_staff_id: None,
            priority: DEFAULT_PRIORITY,
            extra_data: ExtraData::new(),
            created_at: now,
            updated_at: now,
            last_message_at: None,
            closed_at: None,
        }
    }

    /// Set the dispatch priority, rejecting values outside 1..=10.
    pub fn set_priority(&mut self, priority: u8) -> Result<(), ConversationError> {
        if !(1..=10).contains(&priority) {
            return Err(ConversationError::Validation(format!(
                "priority must be between 1 and 10, got {priority}"
            )));
        }
        self.priority = priority;
        Ok(())
    }
}
