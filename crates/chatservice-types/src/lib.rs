//! Shared domain types for the chat service.
//!
//! This crate contains the conversation model: `Model`, `ChatMessage`,
//! `ChatConfig`, the `Chat` aggregate with its token-window eviction, the
//! provider request/stream types, use-case DTOs, configuration, and the
//! associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod completion;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
