//! Realtime fan-out: room-per-user delivery to live WebSocket connections.
//!
//! `ConnectionRegistry` is the only in-process shared mutable state in the
//! service. The rest of the system goes through `register`, `unregister`
//! and `send_to`; nothing else touches the maps.
//!
//! With `REDIS_URL` set, `RealtimeFanout` publishes on a per-user channel so
//! every instance delivers to the connections it holds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::notification::NotificationRecord;

pub type ConnectionId = Uuid;

const CHANNEL_PREFIX: &str = "ideahub:notify:";

/// Frame pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub event: String,
    pub data: serde_json::Value,
}

impl RealtimeMessage {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The "you have a new notification" signal. Clients re-fetch the full
    /// record from the store; only ids travel here.
    pub fn new_notification(record: &NotificationRecord) -> Self {
        Self::new(
            "newNotification",
            serde_json::json!({
                "message": "New Notification",
                "status": "true",
                "notificationId": record.id,
                "category": record.category,
            }),
        )
    }
}

// ── Registry ──────────────────────────────────────────────────

/// user id → live connections, plus the reverse index used on disconnect.
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: DashMap<String, HashMap<ConnectionId, mpsc::UnboundedSender<RealtimeMessage>>>,
    owners: DashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with a user. A connection that re-registers
    /// under another user is moved (last write wins).
    pub fn register(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
        sender: mpsc::UnboundedSender<RealtimeMessage>,
    ) {
        // Owner is written while the room entry is held, so a concurrent
        // unregister sees either both or neither.
        let previous = {
            let mut room = self.rooms.entry(user_id.to_string()).or_default();
            room.insert(conn_id, sender);
            self.owners.insert(conn_id, user_id.to_string())
        };
        if let Some(previous) = previous {
            if previous != user_id {
                self.leave_room(&previous, conn_id);
            }
        }
        debug!(user_id, %conn_id, "connection registered");
    }

    /// Drop a connection. Unknown ids are ignored.
    pub fn unregister(&self, conn_id: ConnectionId) {
        if let Some((_, user_id)) = self.owners.remove(&conn_id) {
            self.leave_room(&user_id, conn_id);
            debug!(user_id = %user_id, %conn_id, "connection unregistered");
        }
    }

    fn leave_room(&self, user_id: &str, conn_id: ConnectionId) {
        if let Some(mut room) = self.rooms.get_mut(user_id) {
            room.remove(&conn_id);
        }
        self.rooms.remove_if(user_id, |_, conns| conns.is_empty());
    }

    /// Deliver to every live connection of `user_id`. Returns the number of
    /// connections that accepted the message. Closed senders are pruned.
    pub fn send_to(&self, user_id: &str, message: &RealtimeMessage) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        if let Some(room) = self.rooms.get(user_id) {
            for (conn_id, sender) in room.iter() {
                if sender.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*conn_id);
                }
            }
        }

        for conn_id in closed {
            self.unregister(conn_id);
        }

        delivered
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.rooms.get(user_id).map(|r| r.len()).unwrap_or(0)
    }

    pub fn online_users(&self) -> usize {
        self.rooms.len()
    }
}

// ── Fan-out ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Delivered by this instance to `n` local connections (0 = offline).
    Delivered(usize),
    /// Handed to the Redis bus; each instance delivers locally.
    Published,
}

impl FanoutOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanoutOutcome::Delivered(0) => "offline",
            FanoutOutcome::Delivered(_) => "delivered",
            FanoutOutcome::Published => "published",
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusEnvelope {
    user_id: String,
    message: RealtimeMessage,
}

/// Cross-instance message bus. Returns how many subscribers received the
/// payload.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish_payload(&self, channel: &str, payload: String) -> anyhow::Result<i64>;
}

#[async_trait]
impl BusPublisher for ConnectionManager {
    async fn publish_payload(&self, channel: &str, payload: String) -> anyhow::Result<i64> {
        let mut conn = self.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        Ok(receivers)
    }
}

#[derive(Clone)]
pub struct RealtimeFanout {
    registry: Arc<ConnectionRegistry>,
    bus: Option<Arc<dyn BusPublisher>>,
    /// Set while this instance's bus subscription is live.
    listening: Arc<AtomicBool>,
}

impl RealtimeFanout {
    pub fn local(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            bus: None,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish through `bus`. `listening` is the flag handed to
    /// `spawn_redis_listener` for the same registry.
    pub fn with_bus(
        registry: Arc<ConnectionRegistry>,
        bus: Arc<dyn BusPublisher>,
        listening: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            bus: Some(bus),
            listening,
        }
    }

    pub fn with_redis(
        registry: Arc<ConnectionRegistry>,
        conn: ConnectionManager,
        listening: Arc<AtomicBool>,
    ) -> Self {
        Self::with_bus(registry, Arc::new(conn), listening)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fire-and-forget. An offline user gets nothing; the signal is not
    /// queued. When this instance's own subscription is down, or nobody
    /// received the publish, local connections are served directly.
    pub async fn notify(&self, user_id: &str, message: RealtimeMessage) -> FanoutOutcome {
        let Some(bus) = &self.bus else {
            return self.deliver_local(user_id, &message);
        };

        let envelope = BusEnvelope {
            user_id: user_id.to_string(),
            message,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id, error = %e, "realtime envelope serialize error");
                return self.deliver_local(user_id, &envelope.message);
            }
        };

        // Read before publishing: a listener that comes up mid-publish may
        // not have seen the payload.
        let listening = self.listening.load(Ordering::Acquire);
        let channel = format!("{}{}", CHANNEL_PREFIX, user_id);
        match bus.publish_payload(&channel, payload).await {
            Ok(receivers) if receivers > 0 && listening => FanoutOutcome::Published,
            Ok(receivers) => {
                debug!(
                    user_id,
                    receivers,
                    listening,
                    "realtime bus not covering this instance, delivering locally"
                );
                self.deliver_local(user_id, &envelope.message)
            }
            Err(e) => {
                warn!(user_id, error = %e, "redis publish failed, delivering locally");
                self.deliver_local(user_id, &envelope.message)
            }
        }
    }

    fn deliver_local(&self, user_id: &str, message: &RealtimeMessage) -> FanoutOutcome {
        let delivered = self.registry.send_to(user_id, message);
        if delivered == 0 {
            debug!(user_id, "user is not connected, realtime signal dropped");
        }
        FanoutOutcome::Delivered(delivered)
    }
}

/// Spawn the Redis subscriber that feeds bus messages into the local
/// registry. `listening` is raised once the subscription is live and
/// lowered whenever it drops. Reconnects with a fixed back-off.
pub fn spawn_redis_listener(
    client: redis::Client,
    registry: Arc<ConnectionRegistry>,
    listening: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = listen(&client, &registry, &listening).await {
                warn!(error = %e, "realtime bus subscription lost, reconnecting in 5s");
            }
            listening.store(false, Ordering::Release);
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });
}

async fn listen(
    client: &redis::Client,
    registry: &ConnectionRegistry,
    listening: &AtomicBool,
) -> anyhow::Result<()> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    pubsub.psubscribe(format!("{}*", CHANNEL_PREFIX)).await?;
    listening.store(true, Ordering::Release);
    info!("subscribed to realtime bus");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        match msg.get_payload::<String>() {
            Ok(payload) => {
                deliver_bus_payload(registry, &payload);
            }
            Err(e) => warn!(error = %e, "unreadable realtime bus payload"),
        }
    }

    anyhow::bail!("realtime bus stream ended")
}

/// Decode one bus envelope and deliver it to the local connections of its
/// user. Returns the number of local deliveries; malformed payloads are
/// logged and dropped.
fn deliver_bus_payload(registry: &ConnectionRegistry, payload: &str) -> usize {
    match serde_json::from_str::<BusEnvelope>(payload) {
        Ok(envelope) => registry.send_to(&envelope.user_id, &envelope.message),
        Err(e) => {
            warn!(error = %e, "malformed realtime bus envelope");
            0
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-process stand-in for Redis: records publishes and reports a fixed
    /// subscriber count.
    struct FakeBus {
        receivers: i64,
        fail: bool,
        published: Mutex<Vec<(String, String)>>,
    }

    impl FakeBus {
        fn new(receivers: i64) -> Self {
            Self {
                receivers,
                fail: false,
                published: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(0)
            }
        }

        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BusPublisher for FakeBus {
        async fn publish_payload(&self, channel: &str, payload: String) -> anyhow::Result<i64> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), payload));
            Ok(self.receivers)
        }
    }

    fn joined(user_id: &str) -> (Arc<ConnectionRegistry>, mpsc::UnboundedReceiver<RealtimeMessage>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(user_id, Uuid::new_v4(), tx);
        (registry, rx)
    }

    fn ping() -> RealtimeMessage {
        RealtimeMessage::new("newNotification", serde_json::json!({"message": "New Notification"}))
    }

    #[tokio::test]
    async fn test_send_to_offline_user_delivers_nothing() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.send_to("ghost", &ping()), 0);
    }

    #[tokio::test]
    async fn test_single_connection_gets_exactly_one_message() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("u1", Uuid::new_v4(), tx);

        assert_eq!(registry.send_to("u1", &ping()), 1);
        assert_eq!(rx.recv().await.unwrap(), ping());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_every_connection_of_user_receives() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        registry.register("u1", Uuid::new_v4(), tx1);
        registry.register("u1", Uuid::new_v4(), tx2);
        registry.register("u2", Uuid::new_v4(), tx3);

        assert_eq!(registry.send_to("u1", &ping()), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_unregister_removes_room() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        registry.register("u1", conn, tx);
        assert_eq!(registry.connection_count("u1"), 1);

        registry.unregister(conn);
        assert_eq!(registry.connection_count("u1"), 0);
        assert_eq!(registry.online_users(), 0);

        // second unregister is a no-op
        registry.unregister(conn);
    }

    #[test]
    fn test_reregister_moves_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        registry.register("u1", conn, tx.clone());
        registry.register("u2", conn, tx);

        assert_eq!(registry.connection_count("u1"), 0);
        assert_eq!(registry.connection_count("u2"), 1);
    }

    #[test]
    fn test_closed_connections_are_pruned_on_send() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("u1", Uuid::new_v4(), tx);
        drop(rx);

        assert_eq!(registry.send_to("u1", &ping()), 0);
        assert_eq!(registry.connection_count("u1"), 0);
    }

    #[tokio::test]
    async fn test_local_fanout_reports_offline() {
        let fanout = RealtimeFanout::local(Arc::new(ConnectionRegistry::new()));
        let outcome = fanout.notify("ghost", ping()).await;
        assert_eq!(outcome, FanoutOutcome::Delivered(0));
        assert_eq!(outcome.as_str(), "offline");
    }

    #[tokio::test]
    async fn test_concurrent_register_and_unregister() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::unbounded_channel();
                let conn = Uuid::new_v4();
                registry.register(&format!("u{}", i % 4), conn, tx);
                registry.unregister(conn);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.online_users(), 0);
    }

    #[tokio::test]
    async fn test_bus_publish_with_live_listener_delivers_once() {
        let (registry, mut rx) = joined("u1");
        let bus = Arc::new(FakeBus::new(1));
        let listening = Arc::new(AtomicBool::new(true));
        let fanout = RealtimeFanout::with_bus(registry.clone(), bus.clone(), listening);

        assert_eq!(fanout.notify("u1", ping()).await, FanoutOutcome::Published);
        // Nothing delivered directly; the listener does it
        assert!(rx.try_recv().is_err());

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "ideahub:notify:u1");
        assert_eq!(deliver_bus_payload(&registry, &published[0].1), 1);
        assert_eq!(rx.try_recv().unwrap(), ping());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listener_down_falls_back_to_local_delivery() {
        let (registry, mut rx) = joined("u1");
        // Other instances are subscribed, this one is reconnecting
        let bus = Arc::new(FakeBus::new(2));
        let fanout = RealtimeFanout::with_bus(registry, bus, Arc::new(AtomicBool::new(false)));

        assert_eq!(fanout.notify("u1", ping()).await, FanoutOutcome::Delivered(1));
        assert_eq!(rx.try_recv().unwrap(), ping());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_falls_back_to_local_delivery() {
        let (registry, mut rx) = joined("u1");
        let fanout = RealtimeFanout::with_bus(
            registry,
            Arc::new(FakeBus::new(0)),
            Arc::new(AtomicBool::new(true)),
        );

        assert_eq!(fanout.notify("u1", ping()).await, FanoutOutcome::Delivered(1));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_failed_publish_falls_back_to_local_delivery() {
        let (registry, mut rx) = joined("u1");
        let fanout = RealtimeFanout::with_bus(
            registry,
            Arc::new(FakeBus::failing()),
            Arc::new(AtomicBool::new(true)),
        );

        assert_eq!(fanout.notify("u1", ping()).await, FanoutOutcome::Delivered(1));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_bus_payload_reaches_only_its_user() {
        let (registry, mut rx) = joined("u1");
        let payload = serde_json::to_string(&BusEnvelope {
            user_id: "u2".into(),
            message: ping(),
        })
        .unwrap();

        assert_eq!(deliver_bus_payload(&registry, &payload), 0);
        assert!(rx.try_recv().is_err());

        let payload = r#"{"userId":"u1","message":{"event":"newNotification","data":{"message":"New Notification"}}}"#;
        assert_eq!(deliver_bus_payload(&registry, payload), 1);
        assert_eq!(rx.try_recv().unwrap(), ping());
    }

    #[test]
    fn test_malformed_bus_payload_is_dropped() {
        let (registry, mut rx) = joined("u1");
        assert_eq!(deliver_bus_payload(&registry, "not json"), 0);
        assert_eq!(deliver_bus_payload(&registry, r#"{"userId":"u1"}"#), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_racing_register_and_unregister_leave_no_orphans() {
        let registry = Arc::new(ConnectionRegistry::new());
        for _ in 0..200 {
            let conn = Uuid::new_v4();
            let (tx, _rx) = mpsc::unbounded_channel();
            std::thread::scope(|s| {
                let r1 = registry.clone();
                let r2 = registry.clone();
                s.spawn(move || r1.register("u1", conn, tx));
                s.spawn(move || r2.unregister(conn));
            });

            // Either the unregister won (nothing left) or it ran first
            // (fully registered). Never a room entry without an owner.
            let in_room = registry
                .rooms
                .get("u1")
                .map(|room| room.contains_key(&conn))
                .unwrap_or(false);
            assert_eq!(in_room, registry.owners.contains_key(&conn));
            registry.unregister(conn);
        }
        assert_eq!(registry.online_users(), 0);
    }
}
