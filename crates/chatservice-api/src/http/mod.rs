//! HTTP/REST API layer for the chat service.
//!
//! Axum-based REST API at `/api/v1/` with static token authentication,
//! envelope response format, SSE streaming, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
