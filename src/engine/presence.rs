//! Presence orchestration: store write-back on full disconnect and
//! contact-scoped broadcast. The Redis-resident state machine itself lives
//! in `crate::presence`; this engine wires it to the store and pub/sub.

use std::sync::Arc;
use std::time::Duration;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::presence::{PresenceService, PresenceStatus};
use crate::pubsub::PubSub;
use crate::state::ServerEvent;

fn personal_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub struct PresenceEngine {
    db: Database,
    presence: Arc<PresenceService>,
    pubsub: Arc<PubSub>,
}

impl PresenceEngine {
    pub fn new(db: Database, presence: Arc<PresenceService>, pubsub: Arc<PubSub>) -> Self {
        Self { db, presence, pubsub }
    }

    pub async fn connect(&self, user_id: &str) -> AppResult<()> {
        let record = self
            .presence
            .connect(user_id)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;
        if record.connection_count == 1 {
            self.broadcast_change(user_id, record.status, None).await?;
        }
        Ok(())
    }

    pub async fn disconnect(&self, user_id: &str) -> AppResult<()> {
        let record = self
            .presence
            .disconnect(user_id)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;
        if record.connection_count == 0 {
            let now = chrono::Utc::now().timestamp();
            self.db.users().set_advisory_status(user_id, "offline", Some(now)).await?;
            self.broadcast_change(user_id, PresenceStatus::Offline, Some(now)).await?;
        }
        Ok(())
    }

    /// Rate-limited to once per 5s per user by the caller's normal
    /// operation-class limiter; `offline` is implicit-only and rejected
    /// here defensively.
    pub async fn set_status(&self, user_id: &str, status: PresenceStatus) -> AppResult<()> {
        if status == PresenceStatus::Offline {
            return Err(AppError::InvalidInput("offline is implicit only".into()));
        }
        self.presence.set_status(user_id, status).await.map_err(|e| AppError::Cache(e.to_string()))?;
        self.broadcast_change(user_id, status, None).await
    }

    pub async fn heartbeat(&self, user_id: &str) -> AppResult<()> {
        self.presence.heartbeat(user_id).await.map_err(|e| AppError::Cache(e.to_string()))
    }

    /// Resolve the user's visible audience (mutual, non-blocked contacts)
    /// and publish to each one's personal room.
    async fn broadcast_change(
        &self,
        user_id: &str,
        status: PresenceStatus,
        last_seen: Option<i64>,
    ) -> AppResult<()> {
        let contacts = self.db.contacts().list(user_id).await?;
        for contact in contacts {
            if contact.is_blocked {
                continue;
            }
            let Some(reverse) = self.db.contacts().find(&contact.contact_user_id, user_id).await? else {
                continue;
            };
            if reverse.is_blocked {
                continue;
            }
            self.pubsub
                .publish(
                    &personal_room(&contact.contact_user_id),
                    &ServerEvent::PresenceUpdate { user_id: user_id.to_string(), status, last_seen },
                )
                .await;
        }
        Ok(())
    }
}

/// Periodic sweep: nothing to actively transition, since presence hashes
/// carry their own TTL and simply vanish from Redis once a heartbeat is
/// missed — `get()` returning `None` already means offline. This task
/// exists to surface that transition as a broadcast event for users who
/// went silent without an explicit disconnect (dropped connection, crashed
/// client), which the passive TTL alone wouldn't announce.
pub async fn run_presence_sweep(
    engine: Arc<PresenceEngine>,
    online_users: Arc<tokio::sync::Mutex<std::collections::HashSet<String>>>,
    interval: Duration,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot: Vec<String> = {
                    let guard = online_users.lock().await;
                    guard.iter().cloned().collect()
                };
                for user_id in snapshot {
                    let still_present = engine.presence.get(&user_id).await.ok().flatten().is_some();
                    if !still_present {
                        let now = chrono::Utc::now().timestamp();
                        if let Err(err) = engine.db.users().set_advisory_status(&user_id, "offline", Some(now)).await {
                            tracing::warn!(user_id, error = %err, "failed to persist lapsed presence");
                        }
                        if let Err(err) = engine.broadcast_change(&user_id, PresenceStatus::Offline, Some(now)).await {
                            tracing::warn!(user_id, error = %err, "failed to broadcast lapsed presence");
                        }
                        online_users.lock().await.remove(&user_id);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("presence sweep task shutting down");
                break;
            }
        }
    }
}
