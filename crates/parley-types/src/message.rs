//! Message domain types for Parley.
//!
//! Messages form a tenant-scoped, append-only log inside a session.
//! A stored message is immutable except for its delivery `status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Kind of content carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    Voice,
    Video,
    Location,
    System,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::Voice => "voice",
            MessageType::Video => "video",
            MessageType::Location => "location",
            MessageType::System => "system",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "voice" => Ok(MessageType::Voice),
            "video" => Ok(MessageType::Video),
            "location" => Ok(MessageType::Location),
            "system" => Ok(MessageType::System),
            other => Err(format!("invalid message type: '{other}'")),
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Staff,
    Bot,
    System,
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SenderType::User => "user",
            SenderType::Staff => "staff",
            SenderType::Bot => "bot",
            SenderType::System => "system",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(SenderType::User),
            "staff" => Ok(SenderType::Staff),
            "bot" => Ok(SenderType::Bot),
            "system" => Ok(SenderType::System),
            other => Err(format!("invalid sender type: '{other}'")),
        }
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Whether a status update from `self` to `to` is allowed.
    ///
    /// Status only moves forward: `sent -> delivered -> read`. `failed`
    /// is reachable only from `sent`, and a same-state update is an
    /// idempotent no-op. There is a single status field; marking a
    /// message read does not record a separate delivered step.
    pub fn can_advance_to(self, to: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, to),
            (Sent, Sent)
                | (Sent, Delivered)
                | (Sent, Read)
                | (Sent, Failed)
                | (Delivered, Delivered)
                | (Delivered, Read)
                | (Read, Read)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("invalid message status: '{other}'")),
        }
    }
}

impl Default for MessageStatus {
    fn default() -> Self {
        MessageStatus::Sent
    }
}

/// Structured reference to an uploaded file, image, or media object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment kind (image, file, audio, ...).
    pub kind: String,
    /// Where the payload lives.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// A stored message within a session.
///
/// Ids are assigned by storage and increase monotonically within a
/// tenant. `timestamp` is event time (when the platform says the message
/// was sent); `created_at` is storage time. They may differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub tenant_id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub sender_type: SenderType,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    pub status: MessageStatus,
}

/// Input for appending a message. Storage assigns id and `created_at`,
/// and fills `timestamp` with the current time when the draft omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDraft {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub sender_type: SenderType,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    /// Draft authored by the end user.
    pub fn user(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            sender_type: SenderType::User,
            sender_id: sender_id.into(),
            timestamp: None,
            attachments: Vec::new(),
        }
    }

    /// Draft authored by a staff member.
    pub fn staff(staff_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            sender_type: SenderType::Staff,
            sender_id: staff_id.into(),
            timestamp: None,
            attachments: Vec::new(),
        }
    }

    /// System-generated draft (status notes, transfer markers).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::System,
            sender_type: SenderType::System,
            sender_id: "system".to_string(),
            timestamp: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            MessageType::Text,
            MessageType::Image,
            MessageType::File,
            MessageType::Voice,
            MessageType::Video,
            MessageType::Location,
            MessageType::System,
        ] {
            let parsed: MessageType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn test_sender_type_roundtrip() {
        for t in [
            SenderType::User,
            SenderType::Staff,
            SenderType::Bot,
            SenderType::System,
        ] {
            let parsed: SenderType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn test_status_advances_forward_only() {
        use MessageStatus::*;
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));

        // No regressions
        assert!(!Delivered.can_advance_to(Sent));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Read.can_advance_to(Sent));
    }

    #[test]
    fn test_status_failed_only_from_sent() {
        use MessageStatus::*;
        assert!(Sent.can_advance_to(Failed));
        assert!(!Delivered.can_advance_to(Failed));
        assert!(!Read.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Sent));
        assert!(!Failed.can_advance_to(Delivered));
        assert!(!Failed.can_advance_to(Read));
    }

    #[test]
    fn test_status_same_state_is_idempotent() {
        use MessageStatus::*;
        for s in [Sent, Delivered, Read, Failed] {
            assert!(s.can_advance_to(s));
        }
    }

    #[test]
    fn test_draft_constructors() {
        let draft = MessageDraft::user("webchat:alice", "hello");
        assert_eq!(draft.sender_type, SenderType::User);
        assert_eq!(draft.message_type, MessageType::Text);
        assert!(draft.timestamp.is_none());

        let draft = MessageDraft::system("session transferred");
        assert_eq!(draft.sender_type, SenderType::System);
        assert_eq!(draft.message_type, MessageType::System);
        assert_eq!(draft.sender_id, "system");
    }

    #[test]
    fn test_draft_serde_defaults() {
        let json = r#"{"content":"hi","sender_type":"user","sender_id":"webchat:alice"}"#;
        let draft: MessageDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.message_type, MessageType::Text);
        assert!(draft.attachments.is_empty());
    }

    #[test]
    fn test_message_serialize() {
        let msg = Message {
            id: 42,
            tenant_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            content: "hello".to_string(),
            message_type: MessageType::Text,
            sender_type: SenderType::User,
            sender_id: "webchat:alice".to_string(),
            timestamp: Utc::now(),
            created_at: Utc::now(),
            attachments: vec![Attachment {
                kind: "image".to_string(),
                url: "https://cdn.example/a.png".to_string(),
                name: None,
                size_bytes: Some(1024),
            }],
            status: MessageStatus::Sent,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"status\":\"sent\""));
        assert!(json.contains("\"sender_type\":\"user\""));
    }
}
