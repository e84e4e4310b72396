//! Infrastructure layer for the chat service.
//!
//! Contains implementations of the port traits defined in `chatservice-core`:
//! SQLite chat storage, the OpenAI-compatible generation provider, and the
//! configuration loader.

pub mod config;
pub mod llm;
pub mod sqlite;
