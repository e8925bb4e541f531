//! streamgate: authenticated push-event streaming over HTTP
//!
//! Wires [`streamgate_core`] into an axum server: configuration from the
//! environment, logging, the HTTP routes, and local JWT tooling.

pub mod commands;
pub mod config;
pub mod logging;
pub mod server;
