//! Connection Manager (G) — session registry, topic index, and broadcast
//! fan-out (`spec.md` §4.7).

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use serde_json::Value;

use super::message::OutboundMessage;
use super::session::Session;
use crate::error::{ChronoError, ChronoResult};

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Aggregate fan-out statistics queried by the `get_stats` message and the
/// HTTP surface.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ConnectionStats {
    /// Currently registered sessions.
    pub session_count: usize,
    /// Currently tracked topics with at least one subscriber.
    pub topic_count: usize,
}

/// Registers real-time sessions, maintains the topic subscription index,
/// and fans broadcasts out to subscribers (`spec.md` §4.7).
///
/// All mutations to the session/topic index go through sharded `DashMap`
/// entries rather than one global lock, so a broadcast never holds a lock
/// across the per-session `send` (`spec.md` §5).
pub struct ConnectionManager {
    sessions: DashMap<String, Arc<Session>>,
    topics: DashMap<String, DashSet<String>>,
    outbound_queue_capacity: usize,
    idle_timeout: Duration,
}

impl ConnectionManager {
    /// Build a connection manager with the given per-session outbound
    /// queue capacity and idle-disconnect threshold.
    #[must_use]
    pub fn new(outbound_queue_capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            topics: DashMap::new(),
            outbound_queue_capacity,
            idle_timeout,
        }
    }

    /// Register a new session for `client_id`, sending a connection-ack
    /// frame. Fails if `client_id` is already registered (`spec.md` §4.7).
    ///
    /// # Errors
    ///
    /// Returns [`ChronoError::invalid_request`] if `client_id` is already
    /// connected.
    pub fn connect(
        &self,
        client_id: &str,
        user_id: Option<String>,
    ) -> ChronoResult<Arc<Session>> {
        if self.sessions.contains_key(client_id) {
            return Err(ChronoError::invalid_request(format!(
                "client_id '{client_id}' is already connected"
            )));
        }

        let now = now_millis();
        let session = Arc::new(Session::new(
            client_id,
            user_id,
            self.outbound_queue_capacity,
            now,
        ));
        session.enqueue(OutboundMessage::ConnectionAck {
            client_id: client_id.to_string(),
            timestamp: now,
        });
        self.sessions.insert(client_id.to_string(), Arc::clone(&session));
        tracing::info!(client_id, "session connected");
        Ok(session)
    }

    /// Remove a session and every topic subscription it held. Idempotent:
    /// disconnecting an already-gone client id is a no-op.
    pub fn disconnect(&self, client_id: &str) {
        let Some((_, session)) = self.sessions.remove(client_id) else {
            return;
        };
        for topic in session.topics() {
            self.remove_from_topic(&topic, client_id);
        }
        tracing::info!(client_id, "session disconnected");
    }

    /// Subscribe `client_id` to `topic`, sending a subscribe-ack.
    ///
    /// # Errors
    ///
    /// Returns [`ChronoError::not_found`] if `client_id` has no session.
    pub fn subscribe(&self, client_id: &str, topic: &str) -> ChronoResult<()> {
        let session = self.session_or_not_found(client_id)?;
        session.subscribe(topic);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(client_id.to_string());
        session.enqueue(OutboundMessage::SubscribeAck {
            topic: topic.to_string(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Unsubscribe `client_id` from `topic`, sending an unsubscribe-ack.
    /// The topic is dropped from the index once its last subscriber
    /// leaves.
    ///
    /// # Errors
    ///
    /// Returns [`ChronoError::not_found`] if `client_id` has no session.
    pub fn unsubscribe(&self, client_id: &str, topic: &str) -> ChronoResult<()> {
        let session = self.session_or_not_found(client_id)?;
        session.unsubscribe(topic);
        self.remove_from_topic(topic, client_id);
        session.enqueue(OutboundMessage::UnsubscribeAck {
            topic: topic.to_string(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    fn remove_from_topic(&self, topic: &str, client_id: &str) {
        if let Some(subscribers) = self.topics.get(topic) {
            subscribers.remove(client_id);
            if subscribers.is_empty() {
                drop(subscribers);
                self.topics.remove_if(topic, |_, s| s.is_empty());
            }
        }
    }

    /// Enqueue `payload` for a single client. Returns `false` if the
    /// session is gone.
    pub fn send_to_client(&self, client_id: &str, payload: OutboundMessage) -> bool {
        self.sessions
            .get(client_id)
            .map(|session| session.enqueue(payload))
            .unwrap_or(false)
    }

    /// Enqueue `payload` (stamped with `topic` and the current server
    /// time) to every current subscriber of `topic`. Returns the number
    /// of sessions that accepted it.
    pub fn broadcast_to_topic(&self, topic: &str, payload: Value) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            return 0;
        };
        let timestamp = now_millis();
        let client_ids: Vec<String> = subscribers.iter().map(|id| id.clone()).collect();
        drop(subscribers);

        let mut delivered = 0;
        for client_id in client_ids {
            if let Some(session) = self.sessions.get(&client_id) {
                let frame = OutboundMessage::Data {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                    timestamp,
                };
                if session.enqueue(frame) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Disconnect every session whose last activity exceeds the idle
    /// timeout. Returns the number disconnected.
    pub fn cleanup_inactive(&self) -> usize {
        let now = now_millis();
        let timeout_ms = self.idle_timeout.as_millis() as i64;
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now - entry.value().last_activity() > timeout_ms)
            .map(|entry| entry.key().clone())
            .collect();

        for client_id in &stale {
            self.disconnect(client_id);
        }
        stale.len()
    }

    /// Look up a session by client id.
    #[must_use]
    pub fn session(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(client_id).map(|s| Arc::clone(&s))
    }

    /// Aggregate session/topic counts.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            session_count: self.sessions.len(),
            topic_count: self.topics.len(),
        }
    }

    fn session_or_not_found(&self, client_id: &str) -> ChronoResult<Arc<Session>> {
        self.sessions
            .get(client_id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| ChronoError::not_found("session", client_id))
    }

    /// Spawn the heartbeat monitor task: pings every session on a fixed
    /// interval and disconnects sessions whose last pong predates the
    /// idle timeout (`spec.md` §4.7 Heartbeats).
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = now_millis();
                        let timeout_ms = manager.idle_timeout.as_millis() as i64;
                        let client_ids: Vec<String> = manager
                            .sessions
                            .iter()
                            .map(|entry| entry.key().clone())
                            .collect();
                        for client_id in client_ids {
                            let Some(session) = manager.session(&client_id) else {
                                continue;
                            };
                            if now - session.last_pong() > timeout_ms {
                                manager.disconnect(&client_id);
                                continue;
                            }
                            session.request_ping();
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Shared handle to the connection manager, passed into HTTP handlers.
pub type SharedConnectionManager = Arc<ConnectionManager>;
