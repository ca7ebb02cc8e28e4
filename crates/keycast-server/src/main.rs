//! KeyCast server entry point.
//!
//! Wires together configuration, the TLS identity, the session manager, and
//! the discovery broadcaster, then runs until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML, defaults on first run
//!  └─ TlsIdentity::load_or_generate()   (when use_tls)
//!  └─ SessionManager::start()  -- accept loop + keepalive
//!  └─ DiscoveryBroadcaster::start()     (when enable_discovery)
//!  └─ event pump               -- logs ServerEvents
//! ```
//!
//! Input capture and screen capture are collaborator traits; the headless
//! binary runs the session engine without them.

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keycast_server::config;
use keycast_server::network::discovery::DiscoveryBroadcaster;
use keycast_server::network::session_manager::{ServerEvent, SessionConfig, SessionManager};
use keycast_server::stream::clamp_frame_rate;
use keycast_server::tls::TlsIdentity;

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

    info!("KeyCast server starting as {:?}", cfg.computer_name);

    let frame_rate = clamp_frame_rate(cfg.frame_rate);
    if frame_rate != cfg.frame_rate {
        warn!(
            "configured frame rate {} out of range, using {frame_rate}",
            cfg.frame_rate
        );
    }
    info!("screen stream configured at {frame_rate} fps");

    // ── TLS identity ──────────────────────────────────────────────────────────
    let acceptor = if cfg.use_tls {
        let dir = config::config_dir()?;
        match TlsIdentity::load_or_generate(&dir) {
            Ok(identity) => Some(identity.acceptor()?),
            Err(e) => {
                // Never silently downgrade: a TLS failure with use_tls=true
                // aborts startup instead of serving clear text.
                error!("TLS identity unavailable: {e}");
                return Err(e.into());
            }
        }
    } else {
        warn!("TLS disabled by configuration; sessions run in clear text");
        None
    };

    // ── Session manager ───────────────────────────────────────────────────────
    let session_config = SessionConfig {
        bind_address: "0.0.0.0".to_string(),
        port: cfg.server_port,
        password: cfg.password.clone(),
        server_name: cfg.computer_name.clone(),
    };
    let (sessions, mut events) = SessionManager::start(session_config, acceptor).await?;
    info!("session listener on {}", sessions.local_addr());

    // ── Discovery broadcaster ─────────────────────────────────────────────────
    let broadcaster = if cfg.enable_discovery {
        match DiscoveryBroadcaster::start(
            cfg.computer_name.clone(),
            cfg.server_port,
            cfg.discovery_port,
        ) {
            Ok(b) => Some(b),
            Err(e) => {
                error!("discovery broadcaster failed to start: {e}");
                None
            }
        }
    } else {
        None
    };

    // ── Event pump ────────────────────────────────────────────────────────────
    let pump = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::ClientConnected { peer_id, address } => {
                    info!("client {peer_id} connected from {address}");
                }
                ServerEvent::ClientAuthenticated {
                    peer_id,
                    client_name,
                } => {
                    info!("client {peer_id} authenticated as {client_name:?}");
                }
                ServerEvent::ClientDisconnected { peer_id } => {
                    info!("client {peer_id} disconnected");
                }
                ServerEvent::CommandOutput { peer_id, output } => {
                    info!("command output from {peer_id}: {}", output.trim_end());
                }
                ServerEvent::FrameAck { peer_id, frame_id } => {
                    tracing::debug!("frame {frame_id} acked by {peer_id}");
                }
                ServerEvent::ClipboardReceived {
                    peer_id, mime_type, ..
                } => {
                    info!("clipboard ({mime_type}) received from {peer_id}");
                }
                ServerEvent::ClipboardRequested { peer_id } => {
                    info!("clipboard requested by {peer_id}");
                }
                ServerEvent::Stopped => break,
            }
        }
    });

    info!("KeyCast server ready. Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if let Some(b) = broadcaster {
        b.stop();
    }
    sessions.stop().await;
    let _ = pump.await;

    info!("KeyCast server stopped");
    Ok(())
}
