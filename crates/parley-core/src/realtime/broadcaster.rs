//! Broadcaster: the authorized facade over the connection registry.
//!
//! Owns the registry together with a session lifecycle handle so that a
//! subscription can only be taken out on a session belonging to the
//! connection's tenant. Everything else delegates to the registry.

use parley_types::error::ConversationError;
use tracing::warn;
use uuid::Uuid;

use crate::realtime::registry::{ConnectionRegistry, ConnectionSink};
use crate::session::{SessionLifecycle, SessionRepository};

/// Narrow fan-out interface handed to transport and ingestion code.
pub struct Broadcaster<S: SessionRepository, T: ConnectionSink> {
    registry: ConnectionRegistry<T>,
    lifecycle: SessionLifecycle<S>,
}

impl<S: SessionRepository, T: ConnectionSink> Broadcaster<S, T> {
    pub fn new(lifecycle: SessionLifecycle<S>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            lifecycle,
        }
    }

    /// Register a connection under its tenant.
    pub fn connect(&self, tenant_id: Uuid, connection_id: &str, sink: T) {
        self.registry.connect(tenant_id, connection_id, sink);
    }

    /// Remove a connection and all its subscriptions.
    pub fn disconnect(&self, tenant_id: Uuid, connection_id: &str) {
        self.registry.disconnect(tenant_id, connection_id);
    }

    /// Subscribe a connection to a session, authorizing against the
    /// session's tenant.
    ///
    /// Returns `false` without side effects when the session does not
    /// exist under `tenant_id` (an unknown id and another tenant's id
    /// are indistinguishable here) or when the connection is not
    /// registered.
    pub async fn subscribe(
        &self,
        session_id: &Uuid,
        tenant_id: &Uuid,
        connection_id: &str,
    ) -> bool {
        match self.lifecycle.get(session_id, tenant_id).await {
            Ok(_) => self.registry.subscribe(session_id, tenant_id, connection_id),
            Err(ConversationError::NotFound) => {
                warn!(
                    %session_id,
                    %tenant_id,
                    connection_id,
                    "subscribe denied: session not visible to tenant"
                );
                false
            }
            Err(err) => {
                warn!(
                    %session_id,
                    connection_id,
                    error = %err,
                    "subscribe failed"
                );
                false
            }
        }
    }

    /// Drop a connection from a session's subscriber set.
    pub fn unsubscribe(&self, session_id: &Uuid, connection_id: &str) {
        self.registry.unsubscribe(session_id, connection_id);
    }

    /// Fan a payload out to a session's subscribers. Self-healing; see
    /// [`ConnectionRegistry::broadcast_to_session`].
    pub async fn broadcast_to_session(
        &self,
        session_id: &Uuid,
        payload: &serde_json::Value,
    ) -> usize {
        self.registry.broadcast_to_session(session_id, payload).await
    }

    /// Fan a payload out to all of a tenant's connections.
    pub async fn broadcast_to_tenant(
        &self,
        tenant_id: &Uuid,
        payload: &serde_json::Value,
    ) -> usize {
        self.registry.broadcast_to_tenant(tenant_id, payload).await
    }

    /// Number of live connections for a tenant.
    pub fn tenant_connection_count(&self, tenant_id: &Uuid) -> usize {
        self.registry.tenant_connection_count(tenant_id)
    }

    /// Number of subscribers of a session.
    pub fn session_subscriber_count(&self, session_id: &Uuid) -> usize {
        self.registry.session_subscriber_count(session_id)
    }
}
