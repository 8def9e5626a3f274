//! Shared data model and wire protocol for Taskboard.

pub mod auth;
pub mod document;
pub mod model;
pub mod protocol;
