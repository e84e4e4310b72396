//! The chat completion use case and its error type.

pub mod error;
pub mod service;

pub use error::CompletionError;
pub use service::ChatCompletionService;
