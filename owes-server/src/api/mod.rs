//! HTTP API for owes-server.

pub mod admin;
pub mod extractors;
pub mod user;
