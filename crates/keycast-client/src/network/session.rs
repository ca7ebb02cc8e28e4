//! Client session state machine.
//!
//! One [`ClientSession`] owns a single logical connection to a server:
//! `Disconnected → Connecting → TlsHandshaking → Authenticating →
//! Authenticated`, with a bounded reconnect loop around the whole thing.
//! Inbound traffic is decoded by [`ReceiveBuffer`] and surfaced as
//! [`ClientEvent`]s; outbound writes go through a bounded channel drained by
//! a dedicated writer task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keycast_core::protocol::codec::encode_packet;
use keycast_core::protocol::framing::ReceiveBuffer;
use keycast_core::protocol::messages::{AuthResult, Message, DEFAULT_SERVER_PORT};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::tls;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Reconnect attempts after an unexpected drop before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Capacity of the outbound write queue.
const OUTBOUND_QUEUE: usize = 256;

/// Capacity of the event channel handed to the caller.
const EVENT_QUEUE: usize = 256;

/// Size of the socket read buffer.
const READ_BUF_SIZE: usize = 8192;

// ── Public types ──────────────────────────────────────────────────────────────

/// Error type for client session operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session loop is already running.
    #[error("session already running")]
    AlreadyRunning,

    /// The configured server address is not usable for TLS.
    #[error(transparent)]
    Tls(#[from] tls::TlsError),

    /// A transport-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection lifecycle states, observable via [`ClientSession::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    TlsHandshaking,
    Authenticating,
    Authenticated,
}

/// Why an authentication attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    InvalidPassword,
    ServerFull,
    VersionMismatch,
    /// A result code this build does not recognize. Still terminal.
    Unknown,
}

impl From<AuthResult> for AuthFailureReason {
    fn from(result: AuthResult) -> Self {
        match result {
            AuthResult::InvalidPassword => AuthFailureReason::InvalidPassword,
            AuthResult::ServerFull => AuthFailureReason::ServerFull,
            AuthResult::VersionMismatch => AuthFailureReason::VersionMismatch,
            // Success never reaches here; anything else is Unknown.
            AuthResult::Success | AuthResult::Unknown(_) => AuthFailureReason::Unknown,
        }
    }
}

/// Events emitted by the session loop, in order, on an `mpsc` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Authentication succeeded; the session is live.
    Authenticated { server_name: String },
    /// The server rejected the credentials. Terminal for this attempt;
    /// auto-reconnect is disabled.
    AuthFailed { reason: AuthFailureReason },
    /// An established connection ended.
    Disconnected,
    /// A reconnect attempt is scheduled after the configured delay.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// All reconnect attempts were used up; the session stays down until
    /// the caller reconnects.
    ReconnectsExhausted,
    /// Broadcast keyboard event to replay locally.
    KeyEvent { vk_code: i32, pressed: bool },
    /// Broadcast mouse button event to replay locally.
    MouseEvent { x: i32, y: i32, button: i32, pressed: bool },
    /// Broadcast cursor movement to replay locally.
    MouseMove { x: i32, y: i32 },
    /// Command the server asked this client to run.
    ExecuteCommand { command: String, command_type: String },
    /// One screen frame from the server's stream. The matching ack has
    /// already been queued by the session loop.
    ScreenFrame { frame_id: u32, width: u32, height: u32, image_data: Vec<u8> },
    /// Clipboard content pushed by the server.
    ClipboardData { mime_type: String, data: Vec<u8> },
    /// The server asked for this client's clipboard.
    ClipboardRequested,
}

/// Connection parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server host: IP literal or hostname.
    pub address: String,
    /// Server TCP port.
    pub port: u16,
    /// Password presented in the Auth packet.
    pub password: String,
    /// Name this machine reports to the server.
    pub computer_name: String,
    /// Whether to wrap the connection in TLS.
    pub use_tls: bool,
    /// Whether to retry after an unexpected drop.
    pub auto_reconnect: bool,
    /// Spacing between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: DEFAULT_SERVER_PORT,
            password: String::new(),
            computer_name: "KeyCast Client".to_string(),
            use_tls: true,
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct Inner {
    config: SessionConfig,
    state: Mutex<SessionState>,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    authenticated: AtomicBool,
    auto_reconnect: AtomicBool,
    running: AtomicBool,
    stopping: AtomicBool,
    shutdown: Notify,
    event_tx: mpsc::Sender<ClientEvent>,
}

/// Handle to a client session. Cheap to clone; all clones drive the same
/// connection.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<Inner>,
}

impl ClientSession {
    /// Creates a session and the event channel its loop will emit on.
    /// The session starts disconnected; call [`connect`](Self::connect).
    pub fn new(config: SessionConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(SessionState::Disconnected),
            outbound: Mutex::new(None),
            authenticated: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            shutdown: Notify::new(),
            event_tx,
        });
        (Self { inner }, event_rx)
    }

    /// Starts the session loop: connect, authenticate, dispatch, reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyRunning`] if the loop is already active.
    pub fn connect(&self) -> Result<(), ClientError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyRunning);
        }
        self.inner.stopping.store(false, Ordering::SeqCst);
        self.inner
            .auto_reconnect
            .store(self.inner.config.auto_reconnect, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_session(Arc::clone(&inner)).await;
            inner.running.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the session has completed authentication.
    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    /// Whether the session loop (including its reconnect cycle) is active.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Sends command output back to the server. No-op unless authenticated.
    pub fn send_command_output(&self, output: String) {
        self.queue_authenticated(Message::CommandOutput { output });
    }

    /// Subscribes to or unsubscribes from the screen stream. No-op unless
    /// authenticated.
    pub fn request_screen_share(&self, subscribe: bool) {
        self.queue_authenticated(Message::ScreenShareRequest { subscribe });
    }

    /// Pushes clipboard content to the server. No-op unless authenticated.
    pub fn send_clipboard(&self, mime_type: String, data: Vec<u8>) {
        self.queue_authenticated(Message::ClipboardData { mime_type, data });
    }

    /// Tears the session down: best-effort Disconnect packet when
    /// authenticated, then closes the transport. Auto-reconnect is disabled.
    pub fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        self.inner.stopping.store(true, Ordering::SeqCst);
        if self.inner.authenticated.load(Ordering::SeqCst) {
            self.queue(Message::Disconnect);
        }
        self.inner.shutdown.notify_waiters();
    }

    fn queue_authenticated(&self, message: Message) {
        if !self.inner.authenticated.load(Ordering::SeqCst) {
            debug!("dropping {:?} before authentication", message.message_type());
            return;
        }
        self.queue(message);
    }

    fn queue(&self, message: Message) {
        let guard = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            if tx.try_send(message).is_err() {
                warn!("outbound queue full or closed; message dropped");
            }
        }
    }
}

// ── Session loop ──────────────────────────────────────────────────────────────

fn set_state(inner: &Inner, state: SessionState) {
    *inner.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
}

async fn emit(inner: &Inner, event: ClientEvent) {
    // The caller owns the receiver; if it is gone the events are moot.
    let _ = inner.event_tx.send(event).await;
}

async fn run_session(inner: Arc<Inner>) {
    let mut attempts: u32 = 0;

    loop {
        set_state(&inner, SessionState::Connecting);
        let target = (inner.config.address.as_str(), inner.config.port);

        match TcpStream::connect(target).await {
            Ok(stream) => {
                info!(
                    "connected to {}:{}",
                    inner.config.address, inner.config.port
                );
                attempts = 0;
                if let Err(e) = drive_transport(&inner, stream).await {
                    warn!("session ended: {e}");
                }
                cleanup(&inner);
                emit(&inner, ClientEvent::Disconnected).await;
            }
            Err(e) => {
                warn!(
                    "connect to {}:{} failed: {e}",
                    inner.config.address, inner.config.port
                );
                set_state(&inner, SessionState::Disconnected);
            }
        }

        if inner.stopping.load(Ordering::SeqCst)
            || !inner.auto_reconnect.load(Ordering::SeqCst)
        {
            break;
        }
        if attempts >= MAX_RECONNECT_ATTEMPTS {
            info!("giving up after {MAX_RECONNECT_ATTEMPTS} reconnect attempts");
            emit(&inner, ClientEvent::ReconnectsExhausted).await;
            break;
        }
        attempts += 1;

        let delay = inner.config.reconnect_delay;
        emit(
            &inner,
            ClientEvent::ReconnectScheduled {
                attempt: attempts,
                delay,
            },
        )
        .await;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.shutdown.notified() => break,
        }
        if inner.stopping.load(Ordering::SeqCst) {
            break;
        }
    }

    set_state(&inner, SessionState::Disconnected);
}

fn cleanup(inner: &Inner) {
    inner.authenticated.store(false, Ordering::SeqCst);
    // Dropping the sender lets the writer task drain and shut the socket.
    inner
        .outbound
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    set_state(inner, SessionState::Disconnected);
}

/// Performs the optional TLS handshake, then runs the framed session.
async fn drive_transport(inner: &Arc<Inner>, stream: TcpStream) -> Result<(), ClientError> {
    if inner.config.use_tls {
        set_state(inner, SessionState::TlsHandshaking);
        let connector = tls::connector();
        let name = tls::server_name(&inner.config.address)?;
        let tls_stream = connector.connect(name, stream).await?;
        run_framed(inner, tls_stream).await
    } else {
        run_framed(inner, stream).await
    }
}

/// Runs the authenticated session over any byte stream: spawns the writer,
/// sends Auth, then dispatches inbound packets until EOF, error, or shutdown.
async fn run_framed<S>(inner: &Arc<Inner>, stream: S) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);

    let (tx, rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    *inner.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx.clone());
    let writer_task = tokio::spawn(writer_loop(writer, rx));

    set_state(inner, SessionState::Authenticating);
    let auth = Message::Auth {
        password: inner.config.password.clone(),
        client_name: inner.config.computer_name.clone(),
    };
    if tx.try_send(auth).is_err() {
        return Err(ClientError::Io(std::io::Error::other(
            "writer queue closed before Auth",
        )));
    }
    drop(tx);

    let mut receive_buffer = ReceiveBuffer::new();
    let mut read_buf = vec![0u8; READ_BUF_SIZE];

    'read: loop {
        if inner.stopping.load(Ordering::SeqCst) {
            break 'read;
        }
        tokio::select! {
            _ = inner.shutdown.notified() => break 'read,
            read = reader.read(&mut read_buf) => {
                let n = read?;
                if n == 0 {
                    break 'read;
                }
                receive_buffer.extend(&read_buf[..n]);
                loop {
                    match receive_buffer.next_message() {
                        Ok(Some(message)) => {
                            if !handle_message(inner, message).await {
                                break 'read;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("protocol error from server, dropping connection: {e}");
                            break 'read;
                        }
                    }
                }
            }
        }
    }

    // Drop the queue sender so the writer drains and closes the socket.
    inner
        .outbound
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    let _ = writer_task.await;
    Ok(())
}

async fn writer_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Message>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let bytes = encode_packet(&message);
        if writer.write_all(&bytes).await.is_err() {
            return;
        }
        if writer.flush().await.is_err() {
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Dispatches one inbound message. Returns `false` when the connection
/// should close.
async fn handle_message(inner: &Arc<Inner>, message: Message) -> bool {
    match message {
        // Keepalive is answered regardless of authentication state.
        Message::Ping => {
            queue_inbound_reply(inner, Message::Pong);
            true
        }
        Message::AuthResponse {
            result,
            server_name,
        } => handle_auth_response(inner, result, server_name).await,
        Message::Disconnect => {
            info!("server requested disconnect");
            inner.auto_reconnect.store(false, Ordering::SeqCst);
            false
        }
        other => handle_gated(inner, other).await,
    }
}

/// Everything except keepalive, auth, and teardown is dropped until the
/// session is authenticated.
async fn handle_gated(inner: &Arc<Inner>, message: Message) -> bool {
    if !inner.authenticated.load(Ordering::SeqCst) {
        debug!(
            "ignoring {:?} before authentication",
            message.message_type()
        );
        return true;
    }

    match message {
        Message::KeyEvent { vk_code, pressed } => {
            emit(inner, ClientEvent::KeyEvent { vk_code, pressed }).await;
        }
        Message::MouseEvent {
            x,
            y,
            button,
            pressed,
        } => {
            emit(
                inner,
                ClientEvent::MouseEvent {
                    x,
                    y,
                    button,
                    pressed,
                },
            )
            .await;
        }
        Message::MouseMove { x, y } => {
            emit(inner, ClientEvent::MouseMove { x, y }).await;
        }
        Message::ExecuteCommand {
            command,
            command_type,
        } => {
            emit(
                inner,
                ClientEvent::ExecuteCommand {
                    command,
                    command_type,
                },
            )
            .await;
        }
        Message::ScreenFrame {
            frame_id,
            width,
            height,
            image_data,
        } => {
            queue_inbound_reply(inner, Message::ScreenFrameAck { frame_id });
            emit(
                inner,
                ClientEvent::ScreenFrame {
                    frame_id,
                    width,
                    height,
                    image_data,
                },
            )
            .await;
        }
        Message::ClipboardData { mime_type, data } => {
            emit(inner, ClientEvent::ClipboardData { mime_type, data }).await;
        }
        Message::ClipboardRequest => {
            emit(inner, ClientEvent::ClipboardRequested).await;
        }
        other => {
            debug!("unexpected {:?} from server", other.message_type());
        }
    }
    true
}

async fn handle_auth_response(inner: &Arc<Inner>, result: AuthResult, server_name: String) -> bool {
    match result {
        AuthResult::Success => {
            inner.authenticated.store(true, Ordering::SeqCst);
            // A live session always recovers from an unexpected drop; only
            // auth rejection, a Disconnect, or disconnect() turn this off.
            inner.auto_reconnect.store(true, Ordering::SeqCst);
            set_state(inner, SessionState::Authenticated);
            info!("authenticated with {server_name:?}");
            emit(inner, ClientEvent::Authenticated { server_name }).await;
            true
        }
        rejected => {
            warn!("authentication rejected: {rejected:?}");
            inner.auto_reconnect.store(false, Ordering::SeqCst);
            emit(
                inner,
                ClientEvent::AuthFailed {
                    reason: rejected.into(),
                },
            )
            .await;
            false
        }
    }
}

fn queue_inbound_reply(inner: &Arc<Inner>, message: Message) {
    let guard = inner.outbound.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(tx) = guard.as_ref() {
        if tx.try_send(message).is_err() {
            warn!("outbound queue full; reply dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig {
            address: "127.0.0.1".to_string(),
            port: 1,
            password: String::new(),
            computer_name: "test".to_string(),
            use_tls: false,
            auto_reconnect: false,
            reconnect_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_new_session_starts_disconnected() {
        let (session, _rx) = ClientSession::new(test_config());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_outbound_is_noop_before_authentication() {
        let (session, _rx) = ClientSession::new(test_config());
        // No connection, not authenticated: these must not panic or queue.
        session.send_command_output("out".to_string());
        session.request_screen_share(true);
        session.send_clipboard("text/plain".to_string(), b"x".to_vec());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let mut cfg = test_config();
        cfg.port = listener.local_addr().expect("local addr").port();

        let (session, _rx) = ClientSession::new(cfg);
        session.connect().expect("first connect");
        // Hold the accepted socket so the session loop stays in its read.
        let (_held, _) = listener.accept().await.expect("accept");

        let second = session.connect();
        assert!(matches!(second, Err(ClientError::AlreadyRunning)));
        session.disconnect();
    }

    #[test]
    fn test_auth_failure_reason_mapping() {
        assert_eq!(
            AuthFailureReason::from(AuthResult::ServerFull),
            AuthFailureReason::ServerFull
        );
        assert_eq!(
            AuthFailureReason::from(AuthResult::VersionMismatch),
            AuthFailureReason::VersionMismatch
        );
        assert_eq!(
            AuthFailureReason::from(AuthResult::InvalidPassword),
            AuthFailureReason::InvalidPassword
        );
        assert_eq!(
            AuthFailureReason::from(AuthResult::Unknown(0x09)),
            AuthFailureReason::Unknown
        );
    }
}
