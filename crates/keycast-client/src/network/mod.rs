//! Network layer: the session state machine and the discovery listener.

pub mod discovery;
pub mod session;

pub use discovery::{DiscoveredServer, DiscoveryListener};
pub use session::{ClientEvent, ClientSession, SessionConfig, SessionState};
