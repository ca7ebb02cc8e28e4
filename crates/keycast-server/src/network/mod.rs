//! Network infrastructure: the session manager and the discovery broadcaster.

pub mod discovery;
pub mod session_manager;

pub use discovery::{DiscoveryBroadcaster, DiscoveryError};
pub use session_manager::{
    PeerInfo, ServerError, ServerEvent, SessionConfig, SessionManager,
};
