//! Context window types handed to downstream AI completion calls.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::message::SenderType;

/// Role of a context message, as the model consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextRole {
    System,
    User,
    Assistant,
}

impl ContextRole {
    /// Map a message sender to a model role.
    ///
    /// System-sent messages carry no conversational turn and return `None`.
    pub fn from_sender(sender: SenderType) -> Option<Self> {
        match sender {
            SenderType::User => Some(ContextRole::User),
            SenderType::Staff | SenderType::Bot => Some(ContextRole::Assistant),
            SenderType::System => None,
        }
    }
}

impl fmt::Display for ContextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextRole::System => "system",
            ContextRole::User => "user",
            ContextRole::Assistant => "assistant",
        };
        write!(f, "{s}")
    }
}

/// One entry of an assembled context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: ContextRole,
    pub content: String,
}

impl ContextMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ContextRole::System,
            content: content.into(),
        }
    }

    pub fn new(role: ContextRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
