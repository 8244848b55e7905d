//! # pilink-server
//!
//! HTTP server library for pilink.
//!
//! This library provides the API handlers, application state and logging
//! setup. The binary in `main.rs` wires them to a Bluetooth backend.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
