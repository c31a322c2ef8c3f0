//! Context window builder.
//!
//! Assembles a bounded, chronologically ordered slice of a session's
//! history for a single AI completion call. System messages are placed
//! first and protected; the remaining budget is filled with conversation
//! turns from newest to oldest, so the window always ends at the present.

use parley_types::context::{ContextMessage, ContextRole};
use parley_types::error::ConversationError;
use parley_types::message::MessageType;
use parley_types::session::Session;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::tokens::{estimate_message, estimate_total, truncate_to_budget};
use crate::message::repository::{MessageFilter, MessageRepository};
use crate::session::{SessionLifecycle, SessionRepository};

/// Default number of recent messages considered for a window.
pub const DEFAULT_WINDOW_SIZE: i64 = 50;

/// Parameters of a context window request.
#[derive(Debug, Clone)]
pub struct ContextParams {
    /// Hard ceiling on the estimated token total of the result.
    pub max_tokens: u32,
    /// Optional system prompt, always the first message when present.
    pub system_prompt: Option<String>,
    /// How many recent messages to consider.
    pub window_size: i64,
    /// Whether to synthesize a system message with session metadata.
    pub include_session_summary: bool,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            max_tokens: 4_000,
            system_prompt: None,
            window_size: DEFAULT_WINDOW_SIZE,
            include_session_summary: false,
        }
    }
}

/// Builds token-budgeted context windows over the message log.
pub struct ContextBuilder<M: MessageRepository, S: SessionRepository> {
    messages: M,
    lifecycle: SessionLifecycle<S>,
}

impl<M: MessageRepository, S: SessionRepository> ContextBuilder<M, S> {
    pub fn new(messages: M, lifecycle: SessionLifecycle<S>) -> Self {
        Self { messages, lifecycle }
    }

    /// Assemble a context window for a session.
    ///
    /// The result is a single finite batch in strict chronological order
    /// whose estimated token total never exceeds `max_tokens`. The first
    /// system message survives even a budget too small for anything else
    /// (truncated if needed); conversation turns are admitted newest
    /// first until the budget runs out, with the overflowing message
    /// proportionally truncated or dropped.
    pub async fn build(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        params: &ContextParams,
    ) -> Result<Vec<ContextMessage>, ConversationError> {
        if params.max_tokens == 0 {
            return Err(ConversationError::Validation("max_tokens is zero".into()));
        }

        let session = self.lifecycle.get(session_id, tenant_id).await?;

        let recent = self
            .messages
            .list_by_session(
                tenant_id,
                session_id,
                &MessageFilter::default(),
                params.window_size.max(1),
                0,
            )
            .await?;

        // Storage returns newest first; the model consumes oldest first.
        let conversation: Vec<ContextMessage> = recent
            .iter()
            .rev()
            .filter(|m| m.message_type != MessageType::System)
            .filter_map(|m| {
                ContextRole::from_sender(m.sender_type)
                    .map(|role| ContextMessage::new(role, m.content.clone()))
            })
            .collect();

        let mut system = Vec::new();
        if let Some(prompt) = params.system_prompt.as_deref() {
            if !prompt.is_empty() {
                system.push(ContextMessage::system(prompt));
            }
        }
        if params.include_session_summary {
            system.push(ContextMessage::system(session_summary(&session)));
        }

        let result = fit_to_budget(system, conversation, params.max_tokens);

        debug!(
            session_id = %session_id,
            tenant_id = %tenant_id,
            messages = result.len(),
            estimated_tokens = estimate_total(&result),
            max_tokens = params.max_tokens,
            "context window assembled"
        );

        Ok(result)
    }
}

/// Synthesized system message describing the session itself.
fn session_summary(session: &Session) -> String {
    format!(
        "Session started at: {}\nUser: {}\nSession status: {}",
        session.created_at.to_rfc3339(),
        session.user_id,
        session.status,
    )
}

/// Apply the token budget: system messages first, then conversation
/// turns admitted newest-to-oldest while preserving chronological order.
fn fit_to_budget(
    system: Vec<ContextMessage>,
    conversation: Vec<ContextMessage>,
    max_tokens: u32,
) -> Vec<ContextMessage> {
    let system_tokens = estimate_total(&system);

    if system_tokens > max_tokens {
        // System messages alone blow the budget: keep the first one,
        // shortened to fit, and drop everything else.
        warn!(
            system_tokens,
            max_tokens, "system messages exceed the token budget"
        );
        return system
            .first()
            .and_then(|first| truncate_to_budget(first, max_tokens))
            .into_iter()
            .collect();
    }

    let remaining = max_tokens - system_tokens;
    let mut selected: Vec<ContextMessage> = Vec::new();
    let mut used: u32 = 0;

    for message in conversation.iter().rev() {
        let tokens = estimate_message(message);
        if used + tokens <= remaining {
            selected.insert(0, message.clone());
            used += tokens;
        } else {
            // This message overflows: shorten it to the leftover budget
            // or leave it out entirely.
            if let Some(truncated) = truncate_to_budget(message, remaining - used) {
                selected.insert(0, truncated);
            }
            break;
        }
    }

    let mut result = system;
    result.extend(selected);
    result
}
