//! UDP discovery listener.
//!
//! Binds the discovery port and decodes server announcements broadcast on
//! the LAN. Each distinct `address:port` is reported once; repeated
//! announcements refresh the stored name and only a changed name re-emits.
//! Announcements a machine receives from itself (local source address
//! advertising our own server port) are suppressed.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keycast_core::protocol::discovery::decode_announcement;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long each blocking receive waits before re-checking the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Capacity of the discovery event channel.
const EVENT_QUEUE: usize = 32;

/// Error type for discovery listener startup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be created or bound.
    #[error("failed to bind discovery port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// A server found on the LAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Human-readable name from the announcement.
    pub name: String,
    /// Source address of the announcement.
    pub address: IpAddr,
    /// TCP port the server's session protocol listens on.
    pub port: u16,
}

/// Listens for server announcements on a background thread.
pub struct DiscoveryListener {
    running: Arc<AtomicBool>,
    local_port: u16,
}

impl DiscoveryListener {
    /// Binds `discovery_port` (with SO_REUSEADDR, so a server and client on
    /// the same machine can share it) and starts the listen thread.
    ///
    /// `local_server_port` identifies this machine's own server, if any, so
    /// its announcements can be filtered out.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Bind`] if the socket cannot be bound.
    pub fn start(
        discovery_port: u16,
        local_server_port: u16,
    ) -> Result<(Self, mpsc::Receiver<DiscoveredServer>), DiscoveryError> {
        let socket = bind_listener(discovery_port)
            .map_err(|source| DiscoveryError::Bind {
                port: discovery_port,
                source,
            })?;
        let local_port = socket
            .local_addr()
            .map_err(|source| DiscoveryError::Bind {
                port: discovery_port,
                source,
            })?
            .port();

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        std::thread::Builder::new()
            .name("keycast-discover".to_string())
            .spawn(move || listen_loop(socket, local_server_port, event_tx, flag))
            .map_err(|source| DiscoveryError::Bind {
                port: discovery_port,
                source,
            })?;

        info!("discovery listener on UDP port {local_port}");
        Ok((
            Self {
                running,
                local_port,
            },
            event_rx,
        ))
    }

    /// Port the listener actually bound (differs from the request for port 0).
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Signals the listen thread to exit. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_listener(port: u16) -> std::io::Result<UdpSocket> {
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&bind_addr.into())?;
    socket.set_read_timeout(Some(READ_TIMEOUT))?;
    Ok(socket.into())
}

fn listen_loop(
    socket: UdpSocket,
    local_server_port: u16,
    event_tx: mpsc::Sender<DiscoveredServer>,
    running: Arc<AtomicBool>,
) {
    let local_addrs = local_addresses();
    let mut seen: HashMap<(IpAddr, u16), String> = HashMap::new();
    let mut buf = [0u8; 1024];

    while running.load(Ordering::SeqCst) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("discovery receive failed: {e}");
                break;
            }
        };

        let ann = match decode_announcement(&buf[..len]) {
            Ok(ann) => ann,
            Err(e) => {
                debug!("ignoring invalid datagram from {src}: {e}");
                continue;
            }
        };

        // Our own server's broadcast loops back on every interface.
        if ann.port == local_server_port && local_addrs.contains(&src.ip()) {
            debug!("suppressing own announcement from {src}");
            continue;
        }

        let key = (src.ip(), ann.port);
        match seen.get(&key) {
            Some(name) if *name == ann.server_name => continue,
            _ => {}
        }
        seen.insert(key, ann.server_name.clone());

        let server = DiscoveredServer {
            name: ann.server_name,
            address: src.ip(),
            port: ann.port,
        };
        info!("found server {:?} at {}:{}", server.name, server.address, server.port);
        if event_tx.blocking_send(server).is_err() {
            break;
        }
    }
}

/// Addresses that count as "this machine" for self-suppression.
fn local_addresses() -> HashSet<IpAddr> {
    let mut addrs: HashSet<IpAddr> = HashSet::new();
    addrs.insert(IpAddr::V4(Ipv4Addr::LOCALHOST));
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                addrs.insert(iface.ip());
            }
        }
        Err(e) => warn!("could not enumerate local interfaces: {e}"),
    }
    addrs
}

// ── Tests ─────────────────────────────────────────────────────────────────────
