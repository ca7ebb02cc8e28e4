//! KeyCast client entry point.
//!
//! Wires together configuration, discovery, the session state machine, and
//! the shell command executor, then runs until the session ends or Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config()                -- TOML, defaults on first run
//!  └─ DiscoveryListener::start()   (when no server_address configured)
//!  └─ ClientSession::connect()     -- TCP (+TLS), auth, reconnect loop
//!  └─ event pump                   -- replays logs, runs commands
//! ```
//!
//! Input injection is a collaborator trait; the headless binary logs the
//! broadcast input instead of replaying it.

use std::time::Duration;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use keycast_client::config;
use keycast_client::exec::{CommandExecutor, CommandKind, ShellExecutor};
use keycast_client::network::discovery::DiscoveryListener;
use keycast_client::network::session::{ClientEvent, ClientSession, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;

    // Structured logging; RUST_LOG overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone())),
        )
        .init();

    info!("KeyCast client starting as {:?}", cfg.computer_name);

    // ── Server address: configured, or first one discovered ──────────────────
    let (address, port) = if cfg.server_address.is_empty() {
        info!("no server configured, listening for announcements");
        let (listener, mut found) =
            DiscoveryListener::start(cfg.discovery_port, cfg.server_port)?;
        let server = tokio::select! {
            server = found.recv() => server,
            _ = tokio::signal::ctrl_c() => None,
        };
        listener.stop();
        match server {
            Some(server) => {
                info!(
                    "using discovered server {:?} at {}:{}",
                    server.name, server.address, server.port
                );
                (server.address.to_string(), server.port)
            }
            None => {
                info!("no server found, exiting");
                return Ok(());
            }
        }
    } else {
        (cfg.server_address.clone(), cfg.server_port)
    };

    // ── Session ───────────────────────────────────────────────────────────────
    let session_config = SessionConfig {
        address,
        port,
        password: cfg.password.clone(),
        computer_name: cfg.computer_name.clone(),
        use_tls: cfg.use_tls,
        auto_reconnect: cfg.auto_reconnect,
        reconnect_delay: Duration::from_secs(cfg.reconnect_delay_secs),
    };
    let (session, mut events) = ClientSession::new(session_config);
    session.connect()?;

    let executor = ShellExecutor::new();

    // ── Event pump ────────────────────────────────────────────────────────────
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                session.disconnect();
                break;
            }
        };
        let Some(event) = event else { break };

        match event {
            ClientEvent::Authenticated { server_name } => {
                info!("authenticated with {server_name:?}");
            }
            ClientEvent::AuthFailed { reason } => {
                warn!("authentication failed: {reason:?}");
            }
            ClientEvent::ExecuteCommand {
                command,
                command_type,
            } => {
                let kind = CommandKind::from_wire(&command_type);
                let output = executor.execute(command, kind);
                let relay = session.clone();
                tokio::spawn(async move {
                    if let Ok(text) = output.await {
                        relay.send_command_output(text);
                    }
                });
            }
            ClientEvent::KeyEvent { vk_code, pressed } => {
                debug!("key {vk_code:#x} {}", if pressed { "down" } else { "up" });
            }
            ClientEvent::MouseEvent {
                x,
                y,
                button,
                pressed,
            } => {
                debug!(
                    "mouse button {button} {} at ({x}, {y})",
                    if pressed { "down" } else { "up" }
                );
            }
            ClientEvent::MouseMove { x, y } => {
                debug!("mouse move to ({x}, {y})");
            }
            ClientEvent::ScreenFrame {
                frame_id,
                width,
                height,
                image_data,
            } => {
                debug!(
                    "frame {frame_id}: {width}x{height}, {} bytes",
                    image_data.len()
                );
            }
            ClientEvent::ClipboardData { mime_type, data } => {
                info!("clipboard received ({mime_type}, {} bytes)", data.len());
            }
            ClientEvent::ClipboardRequested => {
                debug!("server requested clipboard; no provider wired");
            }
            ClientEvent::ReconnectScheduled { attempt, delay } => {
                info!("reconnect attempt {attempt} in {delay:?}");
            }
            ClientEvent::ReconnectsExhausted => {
                warn!("reconnect attempts exhausted");
                break;
            }
            ClientEvent::Disconnected => {
                info!("disconnected from server");
                // Give the session loop a moment to decide on a reconnect.
                tokio::time::sleep(Duration::from_millis(200)).await;
                if !session.is_running() {
                    break;
                }
            }
        }
    }

    info!("KeyCast client stopped");
    Ok(())
}
