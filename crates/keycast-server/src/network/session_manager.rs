//! SessionManager: accept loop, peer registry, authentication, and fan-out.
//!
//! Each accepted connection gets a short peer id and two dedicated tasks: a
//! reader that reassembles packets through a [`ReceiveBuffer`], and a writer
//! that drains a bounded per-peer outbound queue. Fan-out methods enqueue
//! onto those queues with `try_send`, so a stalled peer fills only its own
//! queue (overflow drops that peer's message) and never delays the others.
//!
//! Authentication: an empty configured password accepts any client; otherwise
//! the submitted password must match exactly. A mismatch is answered with
//! `AuthResponse(InvalidPassword)` followed by a forced disconnect; a peer
//! is never left connected unauthenticated after a failed attempt.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keycast_core::protocol::messages::DEFAULT_SERVER_PORT;
use keycast_core::{encode_packet, AuthResult, Message, ReceiveBuffer};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error type for session manager operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bind address string could not be parsed.
    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),

    /// The TCP listener could not be bound.
    #[error("failed to bind session listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred on the listener.
    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the session listener.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// IP address to bind on. `"0.0.0.0"` binds all interfaces.
    pub bind_address: String,
    /// TCP port to listen on. Port 0 lets the OS pick (used by tests).
    pub port: u16,
    /// Session password. Empty accepts any client.
    pub password: String,
    /// Name sent back to clients in a successful `AuthResponse`.
    pub server_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_SERVER_PORT,
            password: String::new(),
            server_name: "KeyCast Server".to_string(),
        }
    }
}

/// Events emitted by the session manager to the application layer.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// A transport (and TLS, when enabled) is up; the peer is not yet
    /// authenticated.
    ClientConnected { peer_id: String, address: SocketAddr },
    /// The peer presented valid credentials.
    ClientAuthenticated { peer_id: String, client_name: String },
    /// The peer is gone; emitted exactly once per connection.
    ClientDisconnected { peer_id: String },
    /// Output of a previously broadcast/sent command.
    CommandOutput { peer_id: String, output: String },
    /// The peer acknowledged receipt of a screen frame.
    FrameAck { peer_id: String, frame_id: u32 },
    /// The peer shared its clipboard content.
    ClipboardReceived {
        peer_id: String,
        mime_type: String,
        data: Vec<u8>,
    },
    /// The peer asked for this machine's clipboard content.
    ClipboardRequested { peer_id: String },
    /// `stop()` completed.
    Stopped,
}

/// Snapshot of one connected peer, returned by [`SessionManager::connected_peers`].
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub peer_id: String,
    pub address: SocketAddr,
    pub client_name: Option<String>,
    pub authenticated: bool,
    pub screen_subscriber: bool,
    pub last_acked_frame: Option<u32>,
}

/// Per-peer state held in the registry.
struct PeerHandle {
    address: SocketAddr,
    client_name: Option<String>,
    authenticated: bool,
    screen_subscriber: bool,
    last_acked_frame: Option<u32>,
    outbound: mpsc::Sender<Message>,
}

/// Capacity of each peer's outbound queue. At 15 fps this holds several
/// seconds of screen frames before a stalled peer starts losing messages.
const OUTBOUND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 64;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const READ_BUF_SIZE: usize = 8192;

struct Inner {
    config: SessionConfig,
    local_addr: SocketAddr,
    peers: Mutex<HashMap<String, PeerHandle>>,
    event_tx: mpsc::Sender<ServerEvent>,
    running: AtomicBool,
    shutdown: Notify,
    tls: Option<TlsAcceptor>,
}

/// Whether the reader loop should keep going after a message.
enum Flow {
    Continue,
    Close,
}

/// The server session manager. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Binds the listener and starts the accept and keepalive tasks.
    ///
    /// Returns the manager together with the receiver for [`ServerEvent`]s.
    /// When `tls` is `Some`, every accepted connection must complete a TLS
    /// server handshake before it is registered as a peer.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the address is invalid or the port cannot
    /// be bound.
    pub async fn start(
        config: SessionConfig,
        tls: Option<TlsAcceptor>,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ServerError> {
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
            .parse()
            .map_err(|_| ServerError::InvalidBindAddress(config.bind_address.clone()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let inner = Arc::new(Inner {
            config,
            local_addr,
            peers: Mutex::new(HashMap::new()),
            event_tx,
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
            tls,
        });

        tokio::spawn(accept_loop(Arc::clone(&inner), listener));
        tokio::spawn(keepalive_loop(Arc::clone(&inner)));

        info!(
            "session manager listening on {} (tls: {})",
            local_addr,
            inner.tls.is_some()
        );
        Ok((Self { inner }, event_rx))
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Snapshot of all currently connected peers.
    pub async fn connected_peers(&self) -> Vec<PeerInfo> {
        let peers = self.inner.peers.lock().await;
        peers
            .iter()
            .map(|(id, p)| PeerInfo {
                peer_id: id.clone(),
                address: p.address,
                client_name: p.client_name.clone(),
                authenticated: p.authenticated,
                screen_subscriber: p.screen_subscriber,
                last_acked_frame: p.last_acked_frame,
            })
            .collect()
    }

    /// Number of authenticated peers currently subscribed to the screen
    /// stream. The frame pipeline polls this to drop frames nobody wants.
    pub async fn subscriber_count(&self) -> usize {
        let peers = self.inner.peers.lock().await;
        peers
            .values()
            .filter(|p| p.authenticated && p.screen_subscriber)
            .count()
    }

    /// Enqueues `msg` to every authenticated peer.
    pub async fn broadcast(&self, msg: Message) {
        let peers = self.inner.peers.lock().await;
        for (id, peer) in peers.iter().filter(|(_, p)| p.authenticated) {
            deliver(id, peer, msg.clone());
        }
    }

    /// Enqueues `msg` to every authenticated peer subscribed to the screen
    /// stream.
    pub async fn broadcast_to_subscribers(&self, msg: Message) {
        let peers = self.inner.peers.lock().await;
        for (id, peer) in peers
            .iter()
            .filter(|(_, p)| p.authenticated && p.screen_subscriber)
        {
            deliver(id, peer, msg.clone());
        }
    }

    /// Enqueues `msg` to exactly one authenticated peer. Unknown or
    /// unauthenticated peer ids are a no-op.
    pub async fn send_to_peer(&self, peer_id: &str, msg: Message) {
        let peers = self.inner.peers.lock().await;
        match peers.get(peer_id) {
            Some(peer) if peer.authenticated => deliver(peer_id, peer, msg),
            _ => debug!("send_to_peer: no authenticated peer {peer_id}"),
        }
    }

    pub async fn broadcast_key_event(&self, vk_code: i32, pressed: bool) {
        self.broadcast(Message::KeyEvent { vk_code, pressed }).await;
    }

    pub async fn broadcast_mouse_event(&self, x: i32, y: i32, button: i32, pressed: bool) {
        self.broadcast(Message::MouseEvent {
            x,
            y,
            button,
            pressed,
        })
        .await;
    }

    pub async fn broadcast_mouse_move(&self, x: i32, y: i32) {
        self.broadcast(Message::MouseMove { x, y }).await;
    }

    pub async fn broadcast_command(&self, command: String, command_type: String) {
        self.broadcast(Message::ExecuteCommand {
            command,
            command_type,
        })
        .await;
    }

    pub async fn send_command_to_peer(&self, peer_id: &str, command: String, command_type: String) {
        self.send_to_peer(
            peer_id,
            Message::ExecuteCommand {
                command,
                command_type,
            },
        )
        .await;
    }

    /// Sends a best-effort Disconnect to the peer and removes it.
    pub async fn disconnect_peer(&self, peer_id: &str) {
        {
            let peers = self.inner.peers.lock().await;
            if let Some(peer) = peers.get(peer_id) {
                let _ = peer.outbound.try_send(Message::Disconnect);
            }
        }
        remove_peer(&self.inner, peer_id).await;
    }

    /// Stops the listener and tears down all peers.
    ///
    /// Each peer gets a best-effort Disconnect packet; the registry is
    /// cleared, which closes the writer queues and lets the writer tasks
    /// flush and shut the sockets down. Idempotent.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.notify_waiters();

        let mut peers = self.inner.peers.lock().await;
        for peer in peers.values() {
            let _ = peer.outbound.try_send(Message::Disconnect);
        }
        peers.clear();
        drop(peers);

        let _ = self.inner.event_tx.send(ServerEvent::Stopped).await;
        info!("session manager stopped");
    }
}

/// Generates a short peer id: the first 8 hex characters of a UUID v4.
fn short_peer_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Enqueues one message onto a peer's outbound queue without blocking.
fn deliver(peer_id: &str, peer: &PeerHandle, msg: Message) {
    match peer.outbound.try_send(msg) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(m)) => {
            warn!(
                "peer {peer_id} outbound queue full, dropping {:?}",
                m.message_type()
            );
        }
        // Writer already gone; the reader task will clean the peer up.
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, address)) => {
                    let peer_id = short_peer_id();
                    debug!("accepted connection from {address} as peer {peer_id}");
                    tokio::spawn(handle_peer(Arc::clone(&inner), stream, peer_id, address));
                }
                Err(e) => warn!("accept error: {e}"),
            },
        }
    }
    debug!("accept loop exited");
}

async fn keepalive_loop(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.tick().await; // the first tick completes immediately
    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => break,
            _ = ticker.tick() => {
                if !inner.running.load(Ordering::Relaxed) {
                    break;
                }
                let peers = inner.peers.lock().await;
                for (id, peer) in peers.iter().filter(|(_, p)| p.authenticated) {
                    deliver(id, peer, Message::Ping);
                }
            }
        }
    }
}

/// Completes the TLS handshake (when enabled) and runs the peer session.
async fn handle_peer(inner: Arc<Inner>, stream: TcpStream, peer_id: String, address: SocketAddr) {
    match inner.tls.clone() {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => run_peer(inner, tls_stream, peer_id, address).await,
            Err(e) => warn!("TLS handshake with {address} failed: {e}"),
        },
        None => run_peer(inner, stream, peer_id, address).await,
    }
}

/// Registers the peer and drives its reader/writer tasks until disconnect.
async fn run_peer<S>(inner: Arc<Inner>, stream: S, peer_id: String, address: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);

    {
        let mut peers = inner.peers.lock().await;
        peers.insert(
            peer_id.clone(),
            PeerHandle {
                address,
                client_name: None,
                authenticated: false,
                screen_subscriber: false,
                last_acked_frame: None,
                outbound: out_tx,
            },
        );
    }
    info!("peer {peer_id} connected from {address}");
    let _ = inner
        .event_tx
        .send(ServerEvent::ClientConnected {
            peer_id: peer_id.clone(),
            address,
        })
        .await;

    // Writer: drains the queue until every sender is dropped, then flushes
    // and closes its half so the peer sees an orderly shutdown.
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if writer.write_all(&encode_packet(&msg)).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut rb = ReceiveBuffer::new();
    let mut read_buf = vec![0u8; READ_BUF_SIZE];
    'read: loop {
        let n = match reader.read(&mut read_buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("peer {peer_id} read error: {e}");
                break;
            }
        };
        rb.extend(&read_buf[..n]);
        loop {
            match rb.next_message() {
                Ok(Some(msg)) => {
                    if let Flow::Close = handle_message(&inner, &peer_id, msg).await {
                        break 'read;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("peer {peer_id} sent an invalid packet, dropping peer: {e}");
                    break 'read;
                }
            }
        }
    }

    // Removing the registry entry drops the queue sender; the writer then
    // drains any pending replies (e.g. a final AuthResponse) before closing.
    remove_peer(&inner, &peer_id).await;
    let _ = writer_task.await;
}

async fn handle_message(inner: &Arc<Inner>, peer_id: &str, msg: Message) -> Flow {
    match msg {
        Message::Auth {
            password,
            client_name,
        } => handle_auth(inner, peer_id, password, client_name).await,
        Message::Pong => {
            debug!("pong from peer {peer_id}");
            Flow::Continue
        }
        Message::ScreenShareRequest { subscribe } => {
            set_subscribed(inner, peer_id, subscribe).await;
            Flow::Continue
        }
        Message::ScreenShareStart => {
            set_subscribed(inner, peer_id, true).await;
            Flow::Continue
        }
        Message::ScreenShareStop => {
            set_subscribed(inner, peer_id, false).await;
            Flow::Continue
        }
        Message::CommandOutput { output } => {
            if is_authenticated(inner, peer_id).await {
                let _ = inner
                    .event_tx
                    .send(ServerEvent::CommandOutput {
                        peer_id: peer_id.to_string(),
                        output,
                    })
                    .await;
            } else {
                debug!("dropping CommandOutput from unauthenticated peer {peer_id}");
            }
            Flow::Continue
        }
        Message::ScreenFrameAck { frame_id } => {
            let mut acked = false;
            {
                let mut peers = inner.peers.lock().await;
                if let Some(peer) = peers.get_mut(peer_id) {
                    if peer.authenticated {
                        peer.last_acked_frame = Some(frame_id);
                        acked = true;
                    }
                }
            }
            if acked {
                let _ = inner
                    .event_tx
                    .send(ServerEvent::FrameAck {
                        peer_id: peer_id.to_string(),
                        frame_id,
                    })
                    .await;
            }
            Flow::Continue
        }
        Message::ClipboardData { mime_type, data } => {
            if is_authenticated(inner, peer_id).await {
                let _ = inner
                    .event_tx
                    .send(ServerEvent::ClipboardReceived {
                        peer_id: peer_id.to_string(),
                        mime_type,
                        data,
                    })
                    .await;
            }
            Flow::Continue
        }
        Message::ClipboardRequest => {
            if is_authenticated(inner, peer_id).await {
                let _ = inner
                    .event_tx
                    .send(ServerEvent::ClipboardRequested {
                        peer_id: peer_id.to_string(),
                    })
                    .await;
            }
            Flow::Continue
        }
        Message::Disconnect => {
            info!("peer {peer_id} requested disconnect");
            Flow::Close
        }
        other => {
            debug!(
                "ignoring unexpected {:?} from peer {peer_id}",
                other.message_type()
            );
            Flow::Continue
        }
    }
}

async fn handle_auth(
    inner: &Arc<Inner>,
    peer_id: &str,
    password: String,
    client_name: String,
) -> Flow {
    let accepted = inner.config.password.is_empty() || password == inner.config.password;

    if accepted {
        {
            let mut peers = inner.peers.lock().await;
            if let Some(peer) = peers.get_mut(peer_id) {
                peer.authenticated = true;
                peer.client_name = Some(client_name.clone());
                let _ = peer.outbound.try_send(Message::AuthResponse {
                    result: AuthResult::Success,
                    server_name: inner.config.server_name.clone(),
                });
            }
        }
        info!("peer {peer_id} authenticated as {client_name:?}");
        let _ = inner
            .event_tx
            .send(ServerEvent::ClientAuthenticated {
                peer_id: peer_id.to_string(),
                client_name,
            })
            .await;
        Flow::Continue
    } else {
        warn!("peer {peer_id} failed authentication");
        let peers = inner.peers.lock().await;
        if let Some(peer) = peers.get(peer_id) {
            let _ = peer.outbound.try_send(Message::AuthResponse {
                result: AuthResult::InvalidPassword,
                server_name: String::new(),
            });
        }
        Flow::Close
    }
}

async fn set_subscribed(inner: &Arc<Inner>, peer_id: &str, subscribed: bool) {
    let mut peers = inner.peers.lock().await;
    match peers.get_mut(peer_id) {
        Some(peer) if peer.authenticated => {
            peer.screen_subscriber = subscribed;
            debug!("peer {peer_id} screen subscription: {subscribed}");
        }
        _ => debug!("ignoring subscription change from unauthenticated peer {peer_id}"),
    }
}

async fn is_authenticated(inner: &Arc<Inner>, peer_id: &str) -> bool {
    let peers = inner.peers.lock().await;
    peers.get(peer_id).map(|p| p.authenticated).unwrap_or(false)
}

/// Removes the peer entry and emits `ClientDisconnected` exactly once.
///
/// Both the reader task (on EOF/error) and `disconnect_peer` call this; the
/// `HashMap::remove` result guards against a double event.
async fn remove_peer(inner: &Arc<Inner>, peer_id: &str) {
    let removed = inner.peers.lock().await.remove(peer_id);
    if removed.is_some() {
        info!("peer {peer_id} disconnected");
        let _ = inner
            .event_tx
            .send(ServerEvent::ClientDisconnected {
                peer_id: peer_id.to_string(),
            })
            .await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default_uses_protocol_port() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.port, 45679);
        assert_eq!(cfg.bind_address, "0.0.0.0");
        assert!(cfg.password.is_empty());
    }

    #[test]
    fn test_short_peer_id_is_eight_hex_chars() {
        let id = short_peer_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_peer_ids_are_unique() {
        let a = short_peer_id();
        let b = short_peer_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let config = SessionConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..SessionConfig::default()
        };

        let (mgr, _rx) = SessionManager::start(config, None).await.expect("start");
        assert_ne!(mgr.local_addr().port(), 0);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_bind_address() {
        let config = SessionConfig {
            bind_address: "not-an-ip".to_string(),
            port: 0,
            ..SessionConfig::default()
        };

        let result = SessionManager::start(config, None).await;
        assert!(matches!(result, Err(ServerError::InvalidBindAddress(_))));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_emits_one_stopped_event() {
        let config = SessionConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..SessionConfig::default()
        };
        let (mgr, mut rx) = SessionManager::start(config, None).await.expect("start");

        mgr.stop().await;
        mgr.stop().await;

        assert_eq!(rx.recv().await, Some(ServerEvent::Stopped));
        // The second stop() must not have queued another Stopped.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscriber_count_starts_at_zero() {
        let config = SessionConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..SessionConfig::default()
        };
        let (mgr, _rx) = SessionManager::start(config, None).await.expect("start");
        assert_eq!(mgr.subscriber_count().await, 0);
        mgr.stop().await;
    }
}
