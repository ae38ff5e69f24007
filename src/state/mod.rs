//! Central dependency-injection container and in-process connection
//! registry, analogous to the teacher's `Matrix` central state struct.

mod connections;
mod events;

pub use connections::ConnectionManager;
pub use events::{ClientEvent, ServerEvent};

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::Database;
use crate::engine::Engines;
use crate::presence::PresenceService;
use crate::pubsub::PubSub;
use crate::security::{RateLimiter, TokenVerifier};

/// Everything a handler or engine needs, held behind `Arc` and cloned
/// cheaply per request/connection — the same role the teacher's `Matrix`
/// plays for its handler dispatch.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: Cache,
    pub pubsub: Arc<PubSub>,
    pub presence: Arc<PresenceService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenVerifier>,
    pub connections: Arc<ConnectionManager>,
    pub engines: Arc<Engines>,
    pub config: Arc<Config>,
    /// Users this instance currently believes are online, fed to the
    /// periodic presence sweep so it only checks users that might have
    /// lapsed without an explicit disconnect.
    pub online_users: Arc<Mutex<HashSet<String>>>,
}

fn personal_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

impl AppState {
    /// Close every connection this user holds, on this instance or any
    /// other: published to the user's personal room, which every instance
    /// housing a live connection for them already subscribes to on connect.
    pub async fn force_disconnect(&self, user_id: &str, reason: &'static str) {
        self.pubsub
            .publish(&personal_room(user_id), &ServerEvent::ForceDisconnect { reason: reason.to_string() })
            .await;
    }

    pub fn new(
        db: Database,
        cache: Cache,
        pubsub: PubSub,
        presence: PresenceService,
        rate_limiter: RateLimiter,
        tokens: TokenVerifier,
        config: Config,
    ) -> Self {
        let pubsub = Arc::new(pubsub);
        let presence = Arc::new(presence);
        let rate_limiter = Arc::new(rate_limiter);
        let connections = Arc::new(ConnectionManager::new());

        let engines = Arc::new(Engines::new(
            db.clone(),
            cache.clone(),
            pubsub.clone(),
            presence.clone(),
            rate_limiter.clone(),
            connections.clone(),
            &config,
        ));

        Self {
            db,
            cache,
            pubsub,
            presence,
            rate_limiter,
            tokens: Arc::new(tokens),
            connections,
            engines,
            config: Arc::new(config),
            online_users: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}
