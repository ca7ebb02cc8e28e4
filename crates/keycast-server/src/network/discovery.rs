//! UDP broadcast-based presence announcements.
//!
//! The server announces itself every 5 seconds so clients on the same LAN can
//! find it without manual address entry. Each round sends one announcement
//! datagram to the subnet broadcast address of every up, non-loopback IPv4
//! interface plus the limited broadcast address `255.255.255.255`.
//!
//! The broadcaster runs on a dedicated thread (synchronous socket I/O keeps
//! it off the Tokio runtime) and stops when the shutdown flag is cleared.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use keycast_core::protocol::discovery::{encode_announcement, Announcement};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for discovery broadcaster operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be created or configured.
    #[error("failed to set up discovery socket: {0}")]
    Socket(std::io::Error),
}

/// Interval between announcement rounds.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);
/// Granularity at which the broadcast thread re-checks the shutdown flag.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Periodically broadcasts [`Announcement`] datagrams until stopped.
pub struct DiscoveryBroadcaster {
    running: Arc<AtomicBool>,
}

impl DiscoveryBroadcaster {
    /// Starts the broadcast thread. The first announcement goes out
    /// immediately, then one round every 5 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Socket`] if the UDP socket cannot be bound
    /// or put into broadcast mode.
    pub fn start(
        server_name: String,
        server_port: u16,
        discovery_port: u16,
    ) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(DiscoveryError::Socket)?;
        socket.set_broadcast(true).map_err(DiscoveryError::Socket)?;

        let datagram = encode_announcement(&Announcement {
            server_name: server_name.clone(),
            port: server_port,
        });
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        std::thread::Builder::new()
            .name("keycast-announce".to_string())
            .spawn(move || {
                broadcast_loop(socket, datagram, discovery_port, running_clone);
            })
            .map_err(DiscoveryError::Socket)?;

        info!("discovery broadcaster started ({server_name:?} -> UDP {discovery_port})");
        Ok(Self { running })
    }

    /// Signals the broadcast thread to stop after its current sleep slice.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for DiscoveryBroadcaster {
    fn drop(&mut self) {
        self.stop();
    }
}

fn broadcast_loop(
    socket: UdpSocket,
    datagram: Vec<u8>,
    discovery_port: u16,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        for target in broadcast_targets() {
            let dest = SocketAddr::from((target, discovery_port));
            if let Err(e) = socket.send_to(&datagram, dest) {
                debug!("announcement to {dest} failed: {e}");
            }
        }

        // Sleep in short slices so stop() takes effect promptly.
        let mut slept = Duration::ZERO;
        while slept < ANNOUNCE_INTERVAL && running.load(Ordering::Relaxed) {
            std::thread::sleep(STOP_POLL);
            slept += STOP_POLL;
        }
    }
    info!("discovery broadcaster stopped");
}

/// Collects the subnet broadcast address of every usable IPv4 interface,
/// plus the limited broadcast address.
fn broadcast_targets() -> Vec<Ipv4Addr> {
    let mut targets: HashSet<Ipv4Addr> = HashSet::new();
    targets.insert(Ipv4Addr::BROADCAST);

    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if iface.is_loopback() {
                    continue;
                }
                if let if_addrs::IfAddr::V4(v4) = iface.addr {
                    if let Some(broadcast) = v4.broadcast {
                        targets.insert(broadcast);
                    }
                }
            }
        }
        Err(e) => warn!("interface enumeration failed, using limited broadcast only: {e}"),
    }

    targets.into_iter().collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keycast_core::protocol::discovery::decode_announcement;

    #[test]
    fn test_broadcast_targets_always_include_limited_broadcast() {
        let targets = broadcast_targets();
        assert!(targets.contains(&Ipv4Addr::BROADCAST));
    }

    #[test]
    fn test_broadcast_targets_exclude_loopback_subnet() {
        let targets = broadcast_targets();
        assert!(!targets.contains(&Ipv4Addr::new(127, 255, 255, 255)));
    }

    #[test]
    fn test_start_and_stop_do_not_panic() {
        let broadcaster =
            DiscoveryBroadcaster::start("test-server".to_string(), 45679, 0).expect("start");
        broadcaster.stop();
    }

    #[test]
    fn test_encoded_announcement_round_trips() {
        // The exact datagram the broadcast thread sends must decode back to
        // the advertised name and port.
        let datagram = encode_announcement(&Announcement {
            server_name: "Desk-A".to_string(),
            port: 45679,
        });
        let ann = decode_announcement(&datagram).expect("valid announcement");
        assert_eq!(ann.server_name, "Desk-A");
        assert_eq!(ann.port, 45679);
    }
}
