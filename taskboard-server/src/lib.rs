//! Taskboard backend server library.
//!
//! Exposes the server for use in tests and embedding. The server keeps
//! per-user documents in memory, authenticates connections by email and
//! password, and pushes live query results over WebSocket.

pub mod auth;
pub mod config;
pub mod db;
pub mod server;
