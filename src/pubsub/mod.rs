//! Cross-instance pub/sub fabric.
//!
//! A single logical channel per room (`conversation:{id}`, a user's
//! personal room, etc). Publishing happens once per event; every instance
//! with at least one local subscriber for that channel receives it and
//! fans out locally via a `tokio::sync::broadcast` channel. Ordering for
//! events published by a single producer is preserved by Redis pub/sub's
//! own per-connection ordering guarantee.
//!
//! Structured the way the teacher structures its cross-instance manager
//! types: one struct owning a client handle, `Arc`-shared, with a
//! background task draining the subscription socket. The teacher's own
//! fabric (`sync::manager::SyncManager`) links whole IRC servers together
//! over a gossiped mesh; this is the simpler publish/subscribe-per-room
//! model the room-broadcast use case actually needs.

mod fabric;

pub use fabric::PubSub;
