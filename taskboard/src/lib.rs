//! Taskboard: todo lists with a priority board on top of a live document
//! store.
//!
//! The [`context::ClientContext`] owns a [`store::DocumentStore`] and an
//! [`identity::IdentityProvider`]; signing in opens a
//! [`session::TodoSession`] that mirrors the user's lists and tasks into a
//! [`board::Board`] and writes intents back through the
//! [`adapter::ListTaskStore`].

pub mod adapter;
pub mod board;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod remote;
pub mod reorder;
pub mod session;
pub mod store;
