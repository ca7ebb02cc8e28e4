//! # keycast-server
//!
//! Server side of KeyCast: accepts authenticated LAN clients over TCP
//! (optionally TLS), fans out keyboard/mouse input, shell commands, and a
//! live screen stream, and announces its presence over UDP broadcast.
//!
//! Modules:
//! - [`network::session_manager`] – accept loop, peer registry, auth, fan-out
//! - [`network::discovery`] – periodic presence announcements
//! - [`stream`] – screen capture trait and the frame pipeline
//! - [`input`] – input capture trait and the broadcast forwarder
//! - [`tls`] – self-signed identity, load-or-generate, TLS acceptor
//! - [`config`] – TOML configuration persistence

pub mod config;
pub mod input;
pub mod network;
pub mod stream;
pub mod tls;

pub use network::session_manager::{ServerEvent, SessionConfig, SessionManager};
