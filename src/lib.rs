//! relaycore - realtime messaging backend core
//!
//! Connection gateway, conversation/message/presence engines, and the REST
//! surface, wired together behind one combined HTTP/WebSocket listener.
//! Split into a library and a thin `relaycored` binary so integration
//! tests can drive the engines directly instead of only through a spawned
//! process.

pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod presence;
pub mod pubsub;
pub mod security;
pub mod state;
