use dashmap::DashMap;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::broadcast;

const LOCAL_BUFFER: usize = 1024;

/// All fan-out channels live under one prefix so a single pattern
/// subscription (`PSUBSCRIBE rc:*`) covers every room without needing to
/// issue dynamic SUBSCRIBE/UNSUBSCRIBE commands at runtime — which would
/// otherwise require holding the pub/sub connection mutably from two
/// places at once.
const CHANNEL_PREFIX: &str = "rc:";

/// Cross-instance pub/sub fabric backed by Redis.
#[derive(Clone)]
pub struct PubSub {
    publish_conn: ConnectionManager,
    local: Arc<DashMap<String, broadcast::Sender<String>>>,
}

impl PubSub {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let publish_conn = client.get_connection_manager().await?;
        let local: Arc<DashMap<String, broadcast::Sender<String>>> = Arc::new(DashMap::new());

        let mut pubsub_conn = client.get_async_pubsub().await?;
        pubsub_conn.psubscribe(format!("{CHANNEL_PREFIX}*")).await?;
        tokio::spawn(Self::drive(pubsub_conn, local.clone()));

        tracing::info!("pub/sub fabric connected");
        Ok(Self { publish_conn, local })
    }

    fn channel_name(room: &str) -> String {
        format!("{CHANNEL_PREFIX}{room}")
    }

    /// Publish a JSON-serializable payload once to `room`.
    pub async fn publish<T: serde::Serialize>(&self, room: &str, payload: &T) {
        let Ok(body) = serde_json::to_string(payload) else {
            tracing::error!(room, "failed to serialize pub/sub payload");
            return;
        };
        let mut conn = self.publish_conn.clone();
        let channel = Self::channel_name(room);
        if let Err(err) = conn.publish::<_, _, ()>(&channel, body).await {
            tracing::warn!(room, error = %err, "pub/sub publish failed");
            return;
        }
        crate::metrics::PUBSUB_PUBLISHED.inc();
    }

    /// Subscribe this instance to `room`'s local fan-out, returning a
    /// receiver fed every payload published to it by any instance
    /// (including this one).
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<String> {
        let channel = Self::channel_name(room);
        if let Some(tx) = self.local.get(&channel) {
            return tx.subscribe();
        }
        let (tx, rx) = broadcast::channel(LOCAL_BUFFER);
        self.local.insert(channel, tx);
        rx
    }

    /// Drop the local fan-out registration for a room once no local
    /// connection cares about it anymore.
    pub fn unsubscribe(&self, room: &str) {
        let channel = Self::channel_name(room);
        if let Some(tx) = self.local.get(&channel)
            && tx.receiver_count() == 0
        {
            drop(tx);
            self.local.remove(&channel);
        }
    }

    async fn drive(mut pubsub_conn: redis::aio::PubSub, local: Arc<DashMap<String, broadcast::Sender<String>>>) {
        let mut stream = pubsub_conn.on_message();
        while let Some(msg) = stream.next().await {
            let channel = msg.get_channel_name().to_string();
            let Ok(payload): Result<String, _> = msg.get_payload() else { continue };
            if let Some(tx) = local.get(&channel) {
                let _ = tx.send(payload);
            }
        }
    }
}
