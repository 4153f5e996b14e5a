//! Shared event and member definitions for `ChatPump`.

pub mod command;
pub mod member;
pub mod message;
