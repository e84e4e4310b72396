//! Chat persistence port and per-chat locking.

pub mod locks;
pub mod repository;
