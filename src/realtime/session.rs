//! A single real-time client session: its bounded outbound queue, the
//! topics it has subscribed to, and activity/heartbeat bookkeeping
//! (`spec.md` §4.7).

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use super::message::OutboundMessage;

/// The transport-facing half of a session: pushes one already-encoded
/// frame out over the wire. Implemented over an Axum WebSocket sink by the
/// HTTP layer; kept as a narrow trait so the connection manager owns no
/// concrete transport type (`spec.md` §4.7, §9).
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Send one raw (already-serialized) frame. Returns `false` if the
    /// transport is closed or the send otherwise failed.
    async fn send(&self, raw: String) -> bool;
}

/// Whether a queued frame is exempt from backpressure-driven eviction.
fn is_control(frame: &OutboundMessage) -> bool {
    matches!(
        frame,
        OutboundMessage::ConnectionAck { .. }
            | OutboundMessage::SubscribeAck { .. }
            | OutboundMessage::UnsubscribeAck { .. }
            | OutboundMessage::Pong { .. }
            | OutboundMessage::Error { .. }
    )
}

/// Bounded per-session outbound queue. When full, the oldest non-control
/// frame is evicted to make room; control frames are never evicted
/// (`spec.md` §4.7 Backpressure).
struct OutboundQueue {
    frames: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
    dropped: AtomicI64,
    notify: Notify,
}

impl OutboundQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity,
            dropped: AtomicI64::new(0),
            notify: Notify::new(),
        }
    }

    fn push(&self, frame: OutboundMessage) -> bool {
        let mut queue = self.frames.lock();
        if queue.len() >= self.capacity {
            if let Some(pos) = queue.iter().position(|f| !is_control(f)) {
                queue.remove(pos);
                self.dropped.fetch_add(1, Ordering::Relaxed);
            } else if !is_control(&frame) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }
        queue.push_back(frame);
        drop(queue);
        self.notify.notify_one();
        true
    }

    fn drain(&self) -> Vec<OutboundMessage> {
        let mut queue = self.frames.lock();
        queue.drain(..).collect()
    }
}

/// One connected real-time client.
pub struct Session {
    client_id: String,
    user_id: Option<String>,
    topics: RwLock<HashSet<String>>,
    queue: OutboundQueue,
    connected_at: i64,
    last_activity: AtomicI64,
    last_pong: AtomicI64,
    ping_requested: AtomicBool,
}

impl Session {
    /// Build a new session for `client_id`, connected at `now` (epoch
    /// milliseconds).
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        user_id: Option<String>,
        queue_capacity: usize,
        now: i64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            user_id,
            topics: RwLock::new(HashSet::new()),
            queue: OutboundQueue::new(queue_capacity),
            connected_at: now,
            last_activity: AtomicI64::new(now),
            last_pong: AtomicI64::new(now),
            ping_requested: AtomicBool::new(false),
        }
    }

    /// This session's client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The authenticated user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Epoch milliseconds this session connected at.
    #[must_use]
    pub const fn connected_at(&self) -> i64 {
        self.connected_at
    }

    /// Enqueue an outbound frame, applying backpressure eviction if the
    /// queue is full. Returns `false` only when the frame itself was
    /// dropped (non-control frame, queue saturated with control frames).
    pub fn enqueue(&self, frame: OutboundMessage) -> bool {
        self.queue.push(frame)
    }

    /// Drain every currently queued frame, in FIFO order, for the writer
    /// task to send.
    pub fn drain_outbound(&self) -> Vec<OutboundMessage> {
        self.queue.drain()
    }

    /// Wait until at least one frame has been enqueued, or a transport-
    /// level ping has been requested, since the last notification. The
    /// writer task awaits this between drains instead of polling.
    pub async fn notified(&self) {
        self.queue.notify.notified().await;
    }

    /// Ask the writer task to send a transport-level ping on its next
    /// wake, used by the heartbeat monitor (`spec.md` §4.7 Heartbeats).
    pub fn request_ping(&self) {
        self.ping_requested.store(true, Ordering::Relaxed);
        self.queue.notify.notify_one();
    }

    /// Consume the pending ping request, if any.
    pub fn take_ping_request(&self) -> bool {
        self.ping_requested.swap(false, Ordering::Relaxed)
    }

    /// Number of frames dropped by backpressure eviction so far.
    #[must_use]
    pub fn dropped_count(&self) -> i64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Add `topic` to this session's subscription set. Returns `true` if
    /// it was newly added.
    pub fn subscribe(&self, topic: &str) -> bool {
        self.topics.write().insert(topic.to_string())
    }

    /// Remove `topic` from this session's subscription set. Returns `true`
    /// if it was present.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.topics.write().remove(topic)
    }

    /// Snapshot of topics this session currently subscribes to.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.read().iter().cloned().collect()
    }

    /// Mark this session as active at `now` (epoch milliseconds).
    pub fn touch(&self, now: i64) {
        self.last_activity.store(now, Ordering::Relaxed);
    }

    /// Record a pong received at `now` (epoch milliseconds).
    pub fn record_pong(&self, now: i64) {
        self.last_pong.store(now, Ordering::Relaxed);
        self.touch(now);
    }

    /// Epoch milliseconds of last observed activity.
    #[must_use]
    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Epoch milliseconds of the last received pong.
    #[must_use]
    pub fn last_pong(&self) -> i64 {
        self.last_pong.load(Ordering::Relaxed)
    }
}

/// Type-erased handle to a session's transport sender, used by the writer
/// task spawned when a session connects.
pub type SharedOutboundSender = Arc<dyn OutboundSender>;

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(id: &str) -> OutboundMessage {
        OutboundMessage::ConnectionAck {
            client_id: id.to_string(),
            timestamp: 0,
        }
    }

    fn data(topic: &str) -> OutboundMessage {
        OutboundMessage::Data {
            topic: topic.to_string(),
            payload: serde_json::json!({}),
            timestamp: 0,
        }
    }

    #[test]
    fn enqueue_and_drain_preserves_order() {
        let session = Session::new("c1", None, 10, 0);
        session.enqueue(data("a"));
        session.enqueue(data("b"));
        let drained = session.drain_outbound();
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn full_queue_drops_oldest_non_control_frame() {
        let session = Session::new("c1", None, 2, 0);
        session.enqueue(data("a"));
        session.enqueue(data("b"));
        session.enqueue(data("c"));

        let drained = session.drain_outbound();
        assert_eq!(drained.len(), 2);
        assert_eq!(session.dropped_count(), 1);
        if let OutboundMessage::Data { topic, .. } = &drained[0] {
            assert_eq!(topic, "b");
        } else {
            panic!("expected data frame");
        }
    }

    #[test]
    fn control_frames_are_never_evicted() {
        let session = Session::new("c1", None, 1, 0);
        session.enqueue(ack("c1"));
        let accepted = session.enqueue(data("a"));
        assert!(!accepted);
        assert_eq!(session.dropped_count(), 1);
        assert_eq!(session.drain_outbound().len(), 1);
    }

    #[test]
    fn subscribe_and_unsubscribe_toggle_membership() {
        let session = Session::new("c1", None, 10, 0);
        assert!(session.subscribe("stock:600000"));
        assert!(!session.subscribe("stock:600000"));
        assert_eq!(session.topics(), vec!["stock:600000".to_string()]);
        assert!(session.unsubscribe("stock:600000"));
        assert!(session.topics().is_empty());
    }
}
