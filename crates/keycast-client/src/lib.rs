//! # keycast-client
//!
//! Client side of KeyCast: connects to a server over TCP (optionally TLS),
//! authenticates, then replays broadcast input events, executes commands,
//! and consumes the screen stream. Servers are found either by configured
//! address or via the UDP discovery listener.
//!
//! Modules:
//! - [`network::session`] – connection state machine with bounded reconnect
//! - [`network::discovery`] – UDP announcement listener
//! - [`tls`] – TLS connector that accepts any server certificate
//! - [`input`] – input replay capability trait
//! - [`exec`] – command execution capability trait
//! - [`config`] – TOML configuration persistence

pub mod config;
pub mod exec;
pub mod input;
pub mod network;
pub mod tls;

pub use network::session::{ClientEvent, ClientSession, SessionConfig, SessionState};
