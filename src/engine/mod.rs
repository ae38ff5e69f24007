//! Business-logic layer sitting between handlers and storage: the message,
//! conversation, presence, and retrieval state machines.

mod conversation;
mod message;
mod presence;
mod retrieval;

pub use conversation::{ConversationEngine, CreateDirectResult};
pub use message::MessageEngine;
pub use presence::{PresenceEngine, run_presence_sweep};
pub use retrieval::{MessagePage, RetrievalEngine, UnreadSummary};

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::Database;
use crate::presence::PresenceService;
use crate::pubsub::PubSub;
use crate::security::RateLimiter;
use crate::state::ConnectionManager;

/// Every engine bundled together and handed to handlers via `AppState`,
/// the same role the teacher's handler-dispatch table plays for routing a
/// parsed command to the struct that knows how to execute it.
pub struct Engines {
    pub message: MessageEngine,
    pub conversation: ConversationEngine,
    /// `Arc`-wrapped (unlike its siblings) so the periodic presence sweep
    /// task can hold its own handle alongside the one `AppState` exposes to
    /// handlers.
    pub presence: Arc<PresenceEngine>,
    pub retrieval: RetrievalEngine,
}

impl Engines {
    pub fn new(
        db: Database,
        cache: Cache,
        pubsub: Arc<PubSub>,
        presence_service: Arc<PresenceService>,
        rate_limiter: Arc<RateLimiter>,
        connections: Arc<ConnectionManager>,
        config: &Config,
    ) -> Self {
        Self {
            message: MessageEngine::new(
                db.clone(),
                cache.clone(),
                pubsub.clone(),
                rate_limiter,
                connections,
                config.limits.clone(),
            ),
            conversation: ConversationEngine::new(db.clone(), pubsub.clone()),
            presence: Arc::new(PresenceEngine::new(db.clone(), presence_service, pubsub)),
            retrieval: RetrievalEngine::new(db, cache, config.limits.clone()),
        }
    }
}
