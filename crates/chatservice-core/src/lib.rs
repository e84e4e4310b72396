//! Use cases and port definitions for the chat service.
//!
//! This crate defines the "ports" (repository, provider, tokenizer, clock and
//! id traits) that the infrastructure layer implements, plus the completion
//! use case built on them. It depends only on `chatservice-types` -- never on
//! `chatservice-infra` or any database/IO crate.

pub mod chat;
pub mod clock;
pub mod completion;
pub mod llm;
pub mod tokenizer;
