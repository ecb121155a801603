//! Integration test common infrastructure.
//!
//! Runs the real network supervisor against a scripted IRC server on a
//! loopback socket and asserts on the lines the bot writes.

pub mod server;

#[allow(unused_imports)]
pub use server::{BotHandle, ServerConn, TestServer, spawn_bot};
