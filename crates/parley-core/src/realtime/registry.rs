//! In-memory registry of live connections, scoped by tenant and by
//! session subscription.
//!
//! Two maps: `tenant_id -> {connection_id -> sink}` for every live
//! connection, and `session_id -> {connection_id -> sink}` for session
//! subscriptions. Broadcasts are best-effort and self-healing: a failed
//! or timed-out delivery prunes that connection and never interrupts
//! fan-out to the rest.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use parley_types::error::DeliveryError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Deadline for a single delivery. A subscriber that cannot accept a
/// payload within this window is treated as dead and pruned, so one
/// hung consumer cannot stall fan-out to the others.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Send half of a live connection.
///
/// Implemented by the transport layer (e.g. a wrapper over the
/// per-connection outbound channel). Cloning must be cheap; the registry
/// clones sinks out of its maps before sending so no lock is held across
/// a send.
pub trait ConnectionSink: Clone + Send + Sync + 'static {
    /// Deliver one serialized JSON payload.
    fn send(
        &self,
        payload: &str,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;
}

/// Process-local registry of live connections.
pub struct ConnectionRegistry<T: ConnectionSink> {
    tenants: DashMap<Uuid, HashMap<String, T>>,
    sessions: DashMap<Uuid, HashMap<String, T>>,
}

impl<T: ConnectionSink> Default for ConnectionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ConnectionSink> ConnectionRegistry<T> {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Register a connection under its tenant.
    ///
    /// Idempotent per `connection_id`: re-registering replaces the sink.
    pub fn connect(&self, tenant_id: Uuid, connection_id: &str, sink: T) {
        self.tenants
            .entry(tenant_id)
            .or_default()
            .insert(connection_id.to_string(), sink);
        debug!(%tenant_id, connection_id, "connection registered");
    }

    /// Remove a connection from its tenant and from every session
    /// subscription. Empty inner maps are pruned.
    pub fn disconnect(&self, tenant_id: Uuid, connection_id: &str) {
        if let Some(mut conns) = self.tenants.get_mut(&tenant_id) {
            conns.remove(connection_id);
        }
        self.tenants.remove_if(&tenant_id, |_, conns| conns.is_empty());

        let subscribed: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().contains_key(connection_id))
            .map(|entry| *entry.key())
            .collect();
        for session_id in subscribed {
            self.unsubscribe(&session_id, connection_id);
        }

        debug!(%tenant_id, connection_id, "connection removed");
    }

    /// Add a registered connection to a session's subscriber set.
    ///
    /// The sink is looked up in the tenant map, so only a currently
    /// connected `connection_id` can subscribe. Returns whether the
    /// subscription took effect. Session-ownership authorization is the
    /// broadcaster's job, not the registry's.
    pub fn subscribe(&self, session_id: &Uuid, tenant_id: &Uuid, connection_id: &str) -> bool {
        let sink = match self
            .tenants
            .get(tenant_id)
            .and_then(|conns| conns.get(connection_id).cloned())
        {
            Some(sink) => sink,
            None => return false,
        };

        self.sessions
            .entry(*session_id)
            .or_default()
            .insert(connection_id.to_string(), sink);
        debug!(%session_id, connection_id, "session subscribed");
        true
    }

    /// Drop a connection from a session's subscriber set.
    pub fn unsubscribe(&self, session_id: &Uuid, connection_id: &str) {
        if let Some(mut subs) = self.sessions.get_mut(session_id) {
            subs.remove(connection_id);
        }
        self.sessions.remove_if(session_id, |_, subs| subs.is_empty());
    }

    /// Fan a payload out to every subscriber of a session.
    ///
    /// Returns the number of successful deliveries. Failed subscribers
    /// are unsubscribed as a side effect.
    pub async fn broadcast_to_session(
        &self,
        session_id: &Uuid,
        payload: &serde_json::Value,
    ) -> usize {
        let targets: Vec<(String, T)> = match self.sessions.get(session_id) {
            Some(subs) => subs
                .iter()
                .map(|(id, sink)| (id.clone(), sink.clone()))
                .collect(),
            None => return 0,
        };

        let (delivered, failed) = deliver(targets, payload).await;
        for connection_id in &failed {
            warn!(
                %session_id,
                connection_id,
                "subscriber send failed, unsubscribing"
            );
            self.unsubscribe(session_id, connection_id);
        }
        delivered
    }

    /// Fan a payload out to every connection of a tenant.
    ///
    /// Returns the number of successful deliveries. Failed connections
    /// are disconnected as a side effect.
    pub async fn broadcast_to_tenant(
        &self,
        tenant_id: &Uuid,
        payload: &serde_json::Value,
    ) -> usize {
        let targets: Vec<(String, T)> = match self.tenants.get(tenant_id) {
            Some(conns) => conns
                .iter()
                .map(|(id, sink)| (id.clone(), sink.clone()))
                .collect(),
            None => return 0,
        };

        let (delivered, failed) = deliver(targets, payload).await;
        for connection_id in &failed {
            warn!(
                %tenant_id,
                connection_id,
                "tenant broadcast send failed, disconnecting"
            );
            self.disconnect(*tenant_id, connection_id);
        }
        delivered
    }

    /// Number of live connections for a tenant.
    pub fn tenant_connection_count(&self, tenant_id: &Uuid) -> usize {
        self.tenants.get(tenant_id).map_or(0, |c| c.len())
    }

    /// Number of subscribers of a session.
    pub fn session_subscriber_count(&self, session_id: &Uuid) -> usize {
        self.sessions.get(session_id).map_or(0, |s| s.len())
    }
}

/// Send `payload` to every target with a per-delivery deadline.
///
/// No registry lock is held here; the maps were snapshotted by the
/// caller. Returns the delivered count and the failed connection ids.
async fn deliver<T: ConnectionSink>(
    targets: Vec<(String, T)>,
    payload: &serde_json::Value,
) -> (usize, Vec<String>) {
    let text = match serde_json::to_string(payload) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to serialize broadcast payload");
            return (0, Vec::new());
        }
    };

    let mut delivered = 0;
    let mut failed = Vec::new();
    for (connection_id, sink) in targets {
        let result = match tokio::time::timeout(SEND_TIMEOUT, sink.send(&text)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        };
        match result {
            Ok(()) => delivered += 1,
            Err(err) => {
                debug!(connection_id, error = %err, "delivery failed");
                failed.push(connection_id);
            }
        }
    }
    (delivered, failed)
}
