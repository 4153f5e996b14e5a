//! `ChatPump`: ordered, asynchronous processing of chat conversation events.
//!
//! A transport integration pushes events into a [`registry::ConversationRegistry`],
//! which routes them to one [`coordinator::ConversationCoordinator`] per
//! registered conversation. Each coordinator owns an event queue drained by
//! consumer workers, a cache of still-editable messages pruned by a periodic
//! sweeper, and the conversation's member directory.

pub mod cache;
pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod edit;
pub mod handler;
pub mod identity;
pub mod members;
pub mod queue;
pub mod registry;
pub mod replay;
pub mod report;
pub mod sweeper;
pub mod transport;
